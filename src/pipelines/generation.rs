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

use crate::common::error::ArticleDescError;
use crate::pipelines::batch::EntityBatch;
use crate::pipelines::corpus::EntityRecordStore;
use crate::pipelines::languages::LanguageRegistry;
use crate::pipelines::output::{PredictionRecord, PredictionSink};

/// Options for a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Locale tag the decoder's initial token is bound to; this is what
    /// conditions the shared model on the target language.
    pub decoder_start_locale: String,
    /// Number of beams for beam search.
    pub num_beams: i64,
    /// Number of sequences returned per call. Always <= `num_beams`.
    pub num_return_sequences: i64,
    /// Minimum output length in tokens.
    pub min_length: i64,
    /// Maximum output length in tokens.
    pub max_length: i64,
    /// Exponential penalty based on hypothesis length.
    pub length_penalty: f64,
    /// Stop the beam search as soon as `num_beams` hypotheses are finished.
    pub early_stopping: bool,
}

/// # Opaque description generation model
///
/// Capability boundary around the multilingual seq2seq model: it accepts one
/// heterogeneous entity batch and returns ranked output token sequences. The
/// architecture, weight loading and device placement are the implementation's
/// concern (tensor-bearing fields are moved to the inference device by the
/// implementation; a no-op if already resident). The handle is read-only after
/// construction and safe to share across calls.
pub trait DescriptionGenerator: Send + Sync {
    /// Runs beam-search generation over the batch, conditioned on
    /// `options.decoder_start_locale`. Returns `num_return_sequences` ranked
    /// token id sequences.
    fn generate(
        &self,
        batch: &EntityBatch,
        options: &GenerateOptions,
    ) -> Result<Vec<Vec<i64>>, ArticleDescError>;

    /// Decodes one output token sequence to text, discarding model-internal
    /// special tokens.
    fn decode(&self, token_ids: &[i64]) -> String;
}

/// # Configuration for description generation
/// Fixed search parameters of the evaluation driver; the service substitutes
/// caller-supplied beam and return counts.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionGenerationConfig {
    /// Minimum sequence length (default: 2)
    pub min_length: i64,
    /// Maximum sequence length (default: 20)
    pub max_length: i64,
    /// Exponential penalty based on hypothesis length (default: 2.0)
    pub length_penalty: f64,
    /// Number of beams for beam search (default: 4)
    pub num_beams: i64,
    /// Number of sequences returned per call (default: 1)
    pub num_return_sequences: i64,
    /// Early stopping flag (default: true)
    pub early_stopping: bool,
}

impl Default for DescriptionGenerationConfig {
    fn default() -> DescriptionGenerationConfig {
        DescriptionGenerationConfig {
            min_length: 2,
            max_length: 20,
            length_penalty: 2.0,
            num_beams: 4,
            num_return_sequences: 1,
            early_stopping: true,
        }
    }
}

impl DescriptionGenerationConfig {
    /// Builds the per-call options for a target locale. The returned beam
    /// count is raised to the return-sequence count when the caller requests
    /// more sequences than beams.
    pub fn options_for(&self, decoder_start_locale: &str) -> GenerateOptions {
        let num_return_sequences = self.num_return_sequences.max(1);
        GenerateOptions {
            decoder_start_locale: decoder_start_locale.to_string(),
            num_beams: self.num_beams.max(num_return_sequences),
            num_return_sequences,
            min_length: self.min_length,
            max_length: self.max_length,
            length_penalty: self.length_penalty,
            early_stopping: self.early_stopping,
        }
    }
}

/// # Generation dispatcher
///
/// For one assembled entity batch, iterates the valid target languages in
/// registry order, specializes the batch per call (removing the target's own
/// summary encoding), invokes the model once per target language and streams
/// one [`PredictionRecord`] per returned sequence to the sink.
pub struct GenerationDispatcher<'a> {
    registry: &'a LanguageRegistry,
    model: &'a dyn DescriptionGenerator,
    config: DescriptionGenerationConfig,
}

impl<'a> GenerationDispatcher<'a> {
    pub fn new(
        registry: &'a LanguageRegistry,
        model: &'a dyn DescriptionGenerator,
        config: DescriptionGenerationConfig,
    ) -> GenerationDispatcher<'a> {
        GenerationDispatcher {
            registry,
            model,
            config,
        }
    }

    /// Dispatches generation for every valid target language of one entity.
    /// Exactly one model call is made per (entity, valid target language)
    /// pair; languages without ground truth are not attempted. Returns the
    /// number of records written.
    pub fn dispatch(
        &self,
        store: &EntityRecordStore,
        entity_index: usize,
        batch: &EntityBatch,
        sink: &mut dyn PredictionSink,
    ) -> Result<usize, ArticleDescError> {
        let mut records_written = 0;
        for target_code in &batch.target_languages {
            let locale = self.registry.locale(target_code).ok_or_else(|| {
                ArticleDescError::InvalidConfigurationError(format!(
                    "Target language {} is not in the registry",
                    target_code
                ))
            })?;
            let reference = store.target(target_code, entity_index).ok_or_else(|| {
                ArticleDescError::DataError(format!(
                    "Target language {} has no ground truth at index {}",
                    target_code, entity_index
                ))
            })?;

            let per_call_batch = batch.for_target(target_code);
            let options = self.config.options_for(locale);
            let output_sequences = self.model.generate(&per_call_batch, &options)?;

            for token_ids in &output_sequences {
                sink.write(&PredictionRecord {
                    prediction: self.model.decode(token_ids),
                    reference: reference.to_string(),
                    locale: locale.to_string(),
                })?;
                records_written += 1;
            }
        }
        Ok(records_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::batch::BatchAssembler;
    use crate::pipelines::corpus::EntityRecordStore;
    use crate::pipelines::output::MemorySink;
    use crate::pipelines::tokenization::{SourceTokenizer, SummaryTokenizer, TokenEncoding};
    use ndarray::Array2;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct EchoTokenizer;

    impl SourceTokenizer for EchoTokenizer {
        fn encode(&self, text: &str, _src_locale: &str) -> Result<TokenEncoding, ArticleDescError> {
            Ok(TokenEncoding::new(
                text.split_whitespace().map(|w| w.len() as i64).collect(),
            ))
        }
    }

    impl SummaryTokenizer for EchoTokenizer {
        fn encode(&self, text: &str) -> Result<TokenEncoding, ArticleDescError> {
            Ok(TokenEncoding::new(
                text.split_whitespace().map(|w| w.len() as i64).collect(),
            ))
        }
    }

    /// Stub model recording every call's options and summary keys.
    struct SpyModel {
        calls: Mutex<Vec<(GenerateOptions, Vec<String>)>>,
    }

    impl SpyModel {
        fn new() -> SpyModel {
            SpyModel {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl DescriptionGenerator for SpyModel {
        fn generate(
            &self,
            batch: &EntityBatch,
            options: &GenerateOptions,
        ) -> Result<Vec<Vec<i64>>, ArticleDescError> {
            let summary_keys = batch
                .summary_encodings
                .as_ref()
                .map(|encodings| {
                    let mut keys: Vec<String> = encodings.keys().cloned().collect();
                    keys.sort_unstable();
                    keys
                })
                .unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((options.clone(), summary_keys));
            Ok(vec![vec![7; 3]; options.num_return_sequences as usize])
        }

        fn decode(&self, token_ids: &[i64]) -> String {
            format!("decoded-{}", token_ids.len())
        }
    }

    fn fixture() -> (LanguageRegistry, EntityRecordStore) {
        let registry = LanguageRegistry::from_locales("en_XX,fr_XX").unwrap();
        let mut sources = HashMap::new();
        let mut targets = HashMap::new();
        sources.insert(
            "en".to_string(),
            vec![Some("a settlement".to_string()), Some("a river".to_string())],
        );
        targets.insert(
            "en".to_string(),
            vec![Some("settlement".to_string()), None],
        );
        sources.insert(
            "fr".to_string(),
            vec![None, Some("une riviere".to_string())],
        );
        targets.insert(
            "fr".to_string(),
            vec![None, Some("riviere de France".to_string())],
        );
        let store = EntityRecordStore::from_parts(
            registry.codes().to_vec(),
            sources,
            targets,
            Array2::zeros((2, 2)),
        )
        .unwrap();
        (registry, store)
    }

    #[test]
    fn one_record_per_valid_target_language() -> anyhow::Result<()> {
        let (registry, store) = fixture();
        let tokenizer = EchoTokenizer;
        let assembler = BatchAssembler::new(&registry, &store, &tokenizer, None, false);
        let model = SpyModel::new();
        let dispatcher =
            GenerationDispatcher::new(&registry, &model, DescriptionGenerationConfig::default());
        let mut sink = MemorySink::new();

        // entity 0: {en: "settlement", fr: sentinel} -> exactly one record, en
        let batch = assembler.assemble(0)?;
        let written = dispatcher.dispatch(&store, 0, &batch, &mut sink)?;
        assert_eq!(written, 1);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].locale, "en_XX");
        assert_eq!(sink.records()[0].reference, "settlement");

        // entity 1: only fr has ground truth
        let batch = assembler.assemble(1)?;
        let written = dispatcher.dispatch(&store, 1, &batch, &mut sink)?;
        assert_eq!(written, 1);
        assert_eq!(sink.records()[1].locale, "fr_XX");

        assert_eq!(model.calls.lock().unwrap().len(), 2);
        Ok(())
    }

    #[test]
    fn decoder_start_is_bound_to_target_locale() -> anyhow::Result<()> {
        let (registry, store) = fixture();
        let tokenizer = EchoTokenizer;
        let assembler = BatchAssembler::new(&registry, &store, &tokenizer, None, false);
        let model = SpyModel::new();
        let dispatcher =
            GenerationDispatcher::new(&registry, &model, DescriptionGenerationConfig::default());
        let mut sink = MemorySink::new();
        let batch = assembler.assemble(1)?;
        dispatcher.dispatch(&store, 1, &batch, &mut sink)?;

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0].0.decoder_start_locale, "fr_XX");
        assert_eq!(calls[0].0.num_beams, 4);
        assert_eq!(calls[0].0.max_length, 20);
        assert_eq!(calls[0].0.min_length, 2);
        assert!((calls[0].0.length_penalty - 2.0).abs() < f64::EPSILON);
        assert!(calls[0].0.early_stopping);
        Ok(())
    }

    #[test]
    fn per_call_batch_excludes_own_summary_encoding() -> anyhow::Result<()> {
        let registry = LanguageRegistry::from_locales("en_XX,fr_XX").unwrap();
        let mut sources = HashMap::new();
        let mut targets = HashMap::new();
        sources.insert("en".to_string(), vec![Some("lead en".to_string())]);
        targets.insert("en".to_string(), vec![Some("desc en".to_string())]);
        sources.insert("fr".to_string(), vec![Some("lead fr".to_string())]);
        targets.insert("fr".to_string(), vec![Some("desc fr".to_string())]);
        let store = EntityRecordStore::from_parts(
            registry.codes().to_vec(),
            sources,
            targets,
            Array2::zeros((1, 2)),
        )?;

        let tokenizer = EchoTokenizer;
        let assembler =
            BatchAssembler::new(&registry, &store, &tokenizer, Some(&tokenizer), false);
        let model = SpyModel::new();
        let dispatcher =
            GenerationDispatcher::new(&registry, &model, DescriptionGenerationConfig::default());
        let mut sink = MemorySink::new();
        let batch = assembler.assemble(0)?;
        dispatcher.dispatch(&store, 0, &batch, &mut sink)?;

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // en call saw only fr's summary, fr call saw only en's
        assert_eq!(calls[0].1, vec!["fr".to_string()]);
        assert_eq!(calls[1].1, vec!["en".to_string()]);
        Ok(())
    }

    #[test]
    fn beam_count_is_raised_to_return_count() {
        let config = DescriptionGenerationConfig {
            num_beams: 2,
            num_return_sequences: 3,
            ..Default::default()
        };
        let options = config.options_for("en_XX");
        assert_eq!(options.num_beams, 3);
        assert_eq!(options.num_return_sequences, 3);
    }

    #[test]
    fn return_count_is_floored_at_one() {
        let config = DescriptionGenerationConfig {
            num_beams: 1,
            num_return_sequences: 0,
            ..Default::default()
        };
        let options = config.options_for("en_XX");
        assert_eq!(options.num_return_sequences, 1);
        assert_eq!(options.num_beams, 1);
    }

    #[test]
    fn multiple_return_sequences_yield_multiple_records() -> anyhow::Result<()> {
        let (registry, store) = fixture();
        let tokenizer = EchoTokenizer;
        let assembler = BatchAssembler::new(&registry, &store, &tokenizer, None, false);
        let model = SpyModel::new();
        let config = DescriptionGenerationConfig {
            num_return_sequences: 3,
            ..Default::default()
        };
        let dispatcher = GenerationDispatcher::new(&registry, &model, config);
        let mut sink = MemorySink::new();
        let batch = assembler.assemble(0)?;
        let written = dispatcher.dispatch(&store, 0, &batch, &mut sink)?;
        assert_eq!(written, 3);
        Ok(())
    }
}
