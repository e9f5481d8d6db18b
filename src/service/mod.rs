// Copyright 2021 The Wikimedia Foundation research team.
// Copyright 2021 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Online description service
//!
//! One inbound request triggers a validation round-trip (language, redirect
//! resolved title), a bounded concurrent fan-out of lead-text fetches (one per
//! sitelink language, plus one ground-truth fetch), and a single generation
//! call once every fan-out task has completed or failed. A failing fetch for
//! one language degrades to an empty lead text rather than aborting the
//! request.
//!
//! Validation failures are a caller-visible contract: they are returned as a
//! descriptive `error` field in an HTTP 200 response, never a 4xx status.

pub mod server;
pub mod wiki;

use crate::common::error::ArticleDescError;
use crate::pipelines::batch::EntityBatch;
use crate::pipelines::generation::{DescriptionGenerationConfig, DescriptionGenerator};
use crate::pipelines::graph_embeddings::GraphEmbeddingResolver;
use crate::pipelines::languages::LanguageRegistry;
use crate::pipelines::tokenization::{SourceTokenizer, SummaryTokenizer};
use crate::service::wiki::{WikiClient, WikidataInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Bound on concurrent upstream fetches per request.
const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Raw query arguments of one `/article` request, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionRequest {
    pub lang: Option<String>,
    pub title: Option<String>,
    pub num_beams: Option<i64>,
    pub num_return: Option<i64>,
}

/// Successful response of the `/article` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptionResponse {
    pub lang: String,
    pub title: String,
    pub num_beams: i64,
    pub num_return: i64,
    pub groundtruth: Option<String>,
    /// Per-stage wall-clock seconds.
    pub latency: HashMap<String, f64>,
    pub features: ResponseFeatures,
    /// Ranked candidate descriptions, best first.
    pub prediction: Vec<String>,
}

/// Model inputs echoed back for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFeatures {
    pub descriptions: HashMap<String, String>,
    #[serde(rename = "first-paragraphs")]
    pub first_paragraphs: HashMap<String, String>,
}

/// Every reply is HTTP 200; failures carry a descriptive `error` field.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DescriptionReply {
    Success(Box<DescriptionResponse>),
    Error { error: String },
}

enum FetchResult {
    Lead(String, String),
    GroundTruth(Option<String>),
}

struct ValidatedRequest {
    lang: String,
    title: String,
    num_beams: i64,
    num_return: i64,
}

/// # Description service
///
/// Owns the language registry, the upstream API client, the tokenizers and the
/// shared model handle. The model handle is read-only after construction;
/// concurrent requests share it.
pub struct DescriptionService {
    registry: LanguageRegistry,
    client: Arc<dyn WikiClient>,
    source_tokenizer: Arc<dyn SourceTokenizer>,
    summary_tokenizer: Option<Arc<dyn SummaryTokenizer>>,
    graph_resolver: Option<Arc<GraphEmbeddingResolver>>,
    model: Arc<dyn DescriptionGenerator>,
    generation: DescriptionGenerationConfig,
    fetch_concurrency: usize,
}

impl DescriptionService {
    pub fn new(
        registry: LanguageRegistry,
        client: Arc<dyn WikiClient>,
        source_tokenizer: Arc<dyn SourceTokenizer>,
        model: Arc<dyn DescriptionGenerator>,
    ) -> DescriptionService {
        DescriptionService {
            registry,
            client,
            source_tokenizer,
            summary_tokenizer: None,
            graph_resolver: None,
            model,
            generation: DescriptionGenerationConfig::default(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Enables the auxiliary summary embedding channel.
    pub fn with_summary_tokenizer(
        mut self,
        summary_tokenizer: Arc<dyn SummaryTokenizer>,
    ) -> DescriptionService {
        self.summary_tokenizer = Some(summary_tokenizer);
        self
    }

    /// Enables the graph embedding channel, resolved from the entity's
    /// instance-of claims at request time.
    pub fn with_graph_resolver(
        mut self,
        graph_resolver: Arc<GraphEmbeddingResolver>,
    ) -> DescriptionService {
        self.graph_resolver = Some(graph_resolver);
        self
    }

    pub fn with_generation_config(
        mut self,
        generation: DescriptionGenerationConfig,
    ) -> DescriptionService {
        self.generation = generation;
        self
    }

    /// Short codes of the supported languages, in configuration order.
    pub fn supported_codes(&self) -> &[String] {
        self.registry.codes()
    }

    /// Handles one `/article` request end to end.
    pub async fn describe(&self, request: DescriptionRequest) -> DescriptionReply {
        let validated = match self.validate(&request).await {
            Ok(validated) => validated,
            Err(error) => {
                return DescriptionReply::Error {
                    error: error.to_string(),
                }
            }
        };

        let start = Instant::now();
        let mut latency = HashMap::new();

        let info = match self
            .client
            .entity_info(&validated.lang, &validated.title)
            .await
        {
            Ok(info) => info,
            Err(error) => {
                warn!(%error, lang = validated.lang.as_str(), "wikidata lookup degraded");
                WikidataInfo::default()
            }
        };
        latency.insert("wikidata-info (s)".to_string(), start.elapsed().as_secs_f64());

        let (first_paragraphs, groundtruth) = self.fan_out(&validated, &info).await;
        latency.insert("total network (s)".to_string(), start.elapsed().as_secs_f64());

        let batch = match self.assemble_online_batch(&validated.lang, &first_paragraphs, &info) {
            Ok(batch) => batch,
            Err(error) => {
                return DescriptionReply::Error {
                    error: format!("batch assembly failed: {}", error),
                }
            }
        };

        let locale = match self.registry.locale(&validated.lang) {
            Some(locale) => locale,
            None => {
                return DescriptionReply::Error {
                    error: format!("unsupported language: {}", validated.lang),
                }
            }
        };
        let mut options = self.generation.options_for(locale);
        options.num_return_sequences = validated.num_return;
        options.num_beams = validated.num_beams.max(validated.num_return);

        let per_call_batch = batch.for_target(&validated.lang);
        let output_sequences = match self.model.generate(&per_call_batch, &options) {
            Ok(sequences) => sequences,
            Err(error) => {
                return DescriptionReply::Error {
                    error: format!("generation unavailable: {}", error),
                }
            }
        };
        let prediction = output_sequences
            .iter()
            .map(|token_ids| self.model.decode(token_ids))
            .collect();
        latency.insert("total (s)".to_string(), start.elapsed().as_secs_f64());

        DescriptionReply::Success(Box::new(DescriptionResponse {
            lang: validated.lang,
            title: validated.title,
            num_beams: options.num_beams,
            num_return: options.num_return_sequences,
            groundtruth,
            latency,
            features: ResponseFeatures {
                descriptions: info.descriptions,
                first_paragraphs,
            },
            prediction,
        }))
    }

    /// Validates the raw request arguments. Every rejected argument is a
    /// [`ArticleDescError::ValueError`]; upstream lookup failures propagate
    /// with their own kind.
    async fn validate(
        &self,
        request: &DescriptionRequest,
    ) -> Result<ValidatedRequest, ArticleDescError> {
        let num_return = request.num_return.unwrap_or(1).max(1);
        let num_beams = request.num_beams.unwrap_or(num_return).max(num_return);
        let (lang, title) = match (&request.lang, &request.title) {
            (Some(lang), Some(title)) => (lang, title),
            (Some(_), None) => {
                return Err(ArticleDescError::ValueError(
                    "missing an article title -- e.g., \"2005_World_Series\" for \
                     https://en.wikipedia.org/wiki/2005_World_Series"
                        .to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ArticleDescError::ValueError(
                    "missing a language -- e.g., \"en\" for English".to_string(),
                ))
            }
            (None, None) => {
                return Err(ArticleDescError::ValueError(
                    "missing language -- e.g., \"en\" for English -- and title -- e.g., \
                     \"2005_World_Series\" for https://en.wikipedia.org/wiki/2005_World_Series"
                        .to_string(),
                ))
            }
        };
        if !self.registry.contains(lang) {
            return Err(ArticleDescError::ValueError(format!(
                "unsupported language: {} -- supported: {}",
                lang,
                self.registry.codes().join(", ")
            )));
        }
        let canonical_title = self
            .client
            .canonical_title(lang, title)
            .await?
            .ok_or_else(|| {
                ArticleDescError::ValueError(format!(
                    "no matching article for https://{}.wikipedia.org/wiki/{}",
                    lang, title
                ))
            })?;
        Ok(ValidatedRequest {
            lang: lang.clone(),
            title: canonical_title,
            num_beams,
            num_return,
        })
    }

    /// Fans out one lead-text fetch per sitelink language plus one
    /// ground-truth fetch, bounded by a semaphore. Generation does not start
    /// until every task has completed or failed; individual failures degrade
    /// to empty / absent values.
    async fn fan_out(
        &self,
        validated: &ValidatedRequest,
        info: &WikidataInfo,
    ) -> (HashMap<String, String>, Option<String>) {
        let semaphore = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut tasks: JoinSet<FetchResult> = JoinSet::new();

        for (code, sitelink_title) in &info.sitelinks {
            if !self.registry.contains(code) {
                continue;
            }
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let code = code.clone();
            let sitelink_title = sitelink_title.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let text = client.first_paragraph(&code, &sitelink_title).await;
                FetchResult::Lead(code, text)
            });
        }
        {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let lang = validated.lang.clone();
            let title = validated.title.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                FetchResult::GroundTruth(client.ground_truth(&lang, &title).await)
            });
        }

        let mut first_paragraphs = HashMap::new();
        let mut groundtruth = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(FetchResult::Lead(code, text)) => {
                    first_paragraphs.insert(code, text);
                }
                Ok(FetchResult::GroundTruth(description)) => groundtruth = description,
                Err(join_error) => {
                    warn!(%join_error, "fetch task failed, degrading to empty value");
                }
            }
        }
        (first_paragraphs, groundtruth)
    }

    /// Builds the entity batch from fetched leads and Wikidata descriptions.
    /// The summary map covers every supported language with a description,
    /// including the target; [`EntityBatch::for_target`] removes the target's
    /// own entry before the generation call.
    fn assemble_online_batch(
        &self,
        target_code: &str,
        first_paragraphs: &HashMap<String, String>,
        info: &WikidataInfo,
    ) -> Result<EntityBatch, ArticleDescError> {
        let mut source_encodings = HashMap::with_capacity(self.registry.len());
        for (code, locale) in self.registry.iter() {
            let encoding = match first_paragraphs.get(code).filter(|text| !text.is_empty()) {
                Some(text) => Some(Arc::new(self.source_tokenizer.encode(text, locale)?)),
                None => None,
            };
            source_encodings.insert(code.to_string(), encoding);
        }

        let graph_embedding = self
            .graph_resolver
            .as_ref()
            .map(|resolver| resolver.resolve(&info.type_ids));

        let summary_encodings = match &self.summary_tokenizer {
            Some(summary_tokenizer) => {
                let mut encodings = HashMap::new();
                for (code, _) in self.registry.iter() {
                    if let Some(description) = info.descriptions.get(code) {
                        encodings
                            .insert(code.to_string(), Arc::new(summary_tokenizer.encode(description)?));
                    }
                }
                Some(encodings)
            }
            None => None,
        };

        Ok(EntityBatch {
            source_encodings,
            graph_embedding,
            summary_encodings,
            target_languages: vec![target_code.to_string()],
        })
    }
}
