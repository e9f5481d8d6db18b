use article_descriptions::common::error::ArticleDescError;
use article_descriptions::pipelines::batch::EntityBatch;
use article_descriptions::pipelines::generation::{DescriptionGenerator, GenerateOptions};
use article_descriptions::pipelines::languages::LanguageRegistry;
use article_descriptions::pipelines::tokenization::{
    SourceTokenizer, SummaryTokenizer, TokenEncoding,
};
use article_descriptions::service::wiki::{WikiClient, WikidataInfo};
use article_descriptions::service::{DescriptionReply, DescriptionRequest, DescriptionService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct WhitespaceTokenizer;

impl SourceTokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str, _src_locale: &str) -> Result<TokenEncoding, ArticleDescError> {
        Ok(TokenEncoding::new(
            text.split_whitespace().map(|w| w.len() as i64).collect(),
        ))
    }
}

impl SummaryTokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<TokenEncoding, ArticleDescError> {
        Ok(TokenEncoding::new(
            text.split_whitespace().map(|w| w.len() as i64).collect(),
        ))
    }
}

/// Offline stand-in for the MediaWiki APIs, seeded with the Clandonald entity.
struct StubWikiClient {
    fail_first_paragraphs: bool,
}

impl StubWikiClient {
    fn new() -> StubWikiClient {
        StubWikiClient {
            fail_first_paragraphs: false,
        }
    }
}

#[async_trait]
impl WikiClient for StubWikiClient {
    async fn entity_info(
        &self,
        _lang: &str,
        _title: &str,
    ) -> Result<WikidataInfo, ArticleDescError> {
        let mut descriptions = HashMap::new();
        descriptions.insert("en".to_string(), "hamlet in Alberta".to_string());
        descriptions.insert("fr".to_string(), "hameau d'Alberta".to_string());
        let mut sitelinks = HashMap::new();
        sitelinks.insert("en".to_string(), "Clandonald".to_string());
        sitelinks.insert("fr".to_string(), "Clandonald".to_string());
        Ok(WikidataInfo {
            descriptions,
            sitelinks,
            type_ids: vec!["Q5084".to_string()],
        })
    }

    async fn first_paragraph(&self, lang: &str, _title: &str) -> String {
        if self.fail_first_paragraphs {
            return String::new();
        }
        match lang {
            "en" => "Clandonald is a hamlet in central Alberta, Canada.".to_string(),
            _ => String::new(),
        }
    }

    async fn ground_truth(&self, _lang: &str, _title: &str) -> Option<String> {
        Some("Hamlet in Alberta, Canada".to_string())
    }

    async fn canonical_title(
        &self,
        _lang: &str,
        title: &str,
    ) -> Result<Option<String>, ArticleDescError> {
        if title == "Clandonald" {
            Ok(Some("Clandonald".to_string()))
        } else {
            Ok(None)
        }
    }
}

/// Stub model capturing the options and summary keys of every call.
struct SpyModel {
    calls: AtomicUsize,
    seen: Mutex<Vec<(GenerateOptions, Vec<String>)>>,
}

impl SpyModel {
    fn new() -> SpyModel {
        SpyModel {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl DescriptionGenerator for SpyModel {
    fn generate(
        &self,
        batch: &EntityBatch,
        options: &GenerateOptions,
    ) -> Result<Vec<Vec<i64>>, ArticleDescError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let summary_keys = batch
            .summary_encodings
            .as_ref()
            .map(|encodings| {
                let mut keys: Vec<String> = encodings.keys().cloned().collect();
                keys.sort_unstable();
                keys
            })
            .unwrap_or_default();
        self.seen
            .lock()
            .unwrap()
            .push((options.clone(), summary_keys));
        Ok((0..options.num_return_sequences)
            .map(|rank| vec![rank, 7])
            .collect())
    }

    fn decode(&self, token_ids: &[i64]) -> String {
        format!("Hamlet in Alberta, Canada ({})", token_ids[0])
    }
}

fn service_with(model: Arc<SpyModel>, client: Arc<StubWikiClient>) -> DescriptionService {
    let registry = LanguageRegistry::from_locales("en_XX,fr_XX").unwrap();
    DescriptionService::new(registry, client, Arc::new(WhitespaceTokenizer), model)
        .with_summary_tokenizer(Arc::new(WhitespaceTokenizer))
}

#[tokio::test]
async fn clandonald_end_to_end() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            num_beams: Some(2),
            num_return: None,
        })
        .await;

    match reply {
        DescriptionReply::Success(response) => {
            assert_eq!(response.lang, "en");
            assert_eq!(response.title, "Clandonald");
            assert!(response.prediction.len() <= 2);
            assert_eq!(
                response.groundtruth.as_deref(),
                Some("Hamlet in Alberta, Canada")
            );
            assert_eq!(
                response.features.first_paragraphs.get("en").map(String::as_str),
                Some("Clandonald is a hamlet in central Alberta, Canada.")
            );
            assert!(response.latency.contains_key("total (s)"));
        }
        DescriptionReply::Error { error } => panic!("unexpected error: {}", error),
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_language_yields_error_without_model_invocation() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: None,
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;

    match reply {
        DescriptionReply::Error { error } => assert!(error.contains("missing a language")),
        DescriptionReply::Success(_) => panic!("expected a validation error"),
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_title_yields_error() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: None,
            ..Default::default()
        })
        .await;
    match reply {
        DescriptionReply::Error { error } => assert!(error.contains("missing an article title")),
        DescriptionReply::Success(_) => panic!("expected a validation error"),
    }
}

#[tokio::test]
async fn unresolvable_title_yields_error() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Klandonald".to_string()),
            ..Default::default()
        })
        .await;
    match reply {
        DescriptionReply::Error { error } => assert!(error.contains("no matching article")),
        DescriptionReply::Success(_) => panic!("expected a validation error"),
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_language_yields_error() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("xx".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;
    match reply {
        DescriptionReply::Error { error } => assert!(error.contains("unsupported language")),
        DescriptionReply::Success(_) => panic!("expected a validation error"),
    }
}

#[tokio::test]
async fn rejected_arguments_surface_as_value_errors() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    for request in [
        DescriptionRequest {
            lang: None,
            title: Some("Clandonald".to_string()),
            ..Default::default()
        },
        DescriptionRequest {
            lang: Some("xx".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        },
        DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Klandonald".to_string()),
            ..Default::default()
        },
    ] {
        match service.describe(request).await {
            DescriptionReply::Error { error } => {
                assert!(error.starts_with("Value error:"), "got: {}", error)
            }
            DescriptionReply::Success(_) => panic!("expected a validation error"),
        }
    }
}

#[tokio::test]
async fn beams_are_raised_to_return_count() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            num_beams: Some(2),
            num_return: Some(3),
        })
        .await;

    match reply {
        DescriptionReply::Success(response) => {
            assert_eq!(response.num_beams, 3);
            assert_eq!(response.num_return, 3);
            assert_eq!(response.prediction.len(), 3);
        }
        DescriptionReply::Error { error } => panic!("unexpected error: {}", error),
    }
    let seen = model.seen.lock().unwrap();
    assert_eq!(seen[0].0.num_beams, 3);
    assert_eq!(seen[0].0.num_return_sequences, 3);
}

#[tokio::test]
async fn defaults_yield_single_beam() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;

    match reply {
        DescriptionReply::Success(response) => {
            assert_eq!(response.num_beams, 1);
            assert_eq!(response.num_return, 1);
            assert_eq!(response.prediction.len(), 1);
        }
        DescriptionReply::Error { error } => panic!("unexpected error: {}", error),
    }
}

#[tokio::test]
async fn summary_channel_excludes_target_language() {
    let model = Arc::new(SpyModel::new());
    let service = service_with(Arc::clone(&model), Arc::new(StubWikiClient::new()));
    service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    // fr's description is visible, the target's own is not
    assert_eq!(seen[0].1, vec!["fr".to_string()]);
    assert_eq!(seen[0].0.decoder_start_locale, "en_XX");
}

#[tokio::test]
async fn failed_lead_fetches_degrade_to_absent_sources() {
    let model = Arc::new(SpyModel::new());
    let client = Arc::new(StubWikiClient {
        fail_first_paragraphs: true,
    });
    let service = service_with(Arc::clone(&model), client);
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;

    // empty lead texts never abort the request
    match reply {
        DescriptionReply::Success(response) => {
            assert_eq!(response.prediction.len(), 1);
        }
        DescriptionReply::Error { error } => panic!("unexpected error: {}", error),
    }
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generation_failure_is_surfaced_not_fatal() {
    struct FailingModel;

    impl DescriptionGenerator for FailingModel {
        fn generate(
            &self,
            _batch: &EntityBatch,
            _options: &GenerateOptions,
        ) -> Result<Vec<Vec<i64>>, ArticleDescError> {
            Err(ArticleDescError::GenerationError(
                "backend offline".to_string(),
            ))
        }

        fn decode(&self, _token_ids: &[i64]) -> String {
            String::new()
        }
    }

    let registry = LanguageRegistry::from_locales("en_XX,fr_XX").unwrap();
    let service = DescriptionService::new(
        registry,
        Arc::new(StubWikiClient::new()),
        Arc::new(WhitespaceTokenizer),
        Arc::new(FailingModel),
    );
    let reply = service
        .describe(DescriptionRequest {
            lang: Some("en".to_string()),
            title: Some("Clandonald".to_string()),
            ..Default::default()
        })
        .await;
    match reply {
        DescriptionReply::Error { error } => assert!(error.contains("generation unavailable")),
        DescriptionReply::Success(_) => panic!("expected a surfaced generation error"),
    }
}
