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

//! # Batch evaluation driver
//!
//! Sequential, single-threaded pass over a dataset shard: for each entity
//! index, assemble one batch, dispatch generation per valid target language and
//! append the results to the three aligned output files. Any malformed input or
//! misalignment is fatal; there is no partial-recovery mode.

use crate::common::error::ArticleDescError;
use crate::pipelines::batch::BatchAssembler;
use crate::pipelines::corpus::EntityRecordStore;
use crate::pipelines::generation::{
    DescriptionGenerationConfig, DescriptionGenerator, GenerationDispatcher,
};
use crate::pipelines::languages::LanguageRegistry;
use crate::pipelines::output::{PredictionSink, SplitFileSink};
use crate::pipelines::tokenization::{SourceTokenizer, SummaryTokenizer};
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Directory holding the `<split>.source<code>` / `<split>.target<code>` /
    /// `<split>.embd` files.
    pub data_dir: PathBuf,
    /// Shard split to evaluate, e.g. `"test"`.
    pub split: String,
    /// Directory the three aligned output files are written to.
    pub output_dir: PathBuf,
    /// Whether to attach the per-entity graph embedding to each batch.
    pub use_graph_embeddings: bool,
    /// Beam-search parameters.
    pub generation: DescriptionGenerationConfig,
}

impl EvaluationConfig {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        split: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> EvaluationConfig {
        EvaluationConfig {
            data_dir: data_dir.into(),
            split: split.into(),
            output_dir: output_dir.into(),
            use_graph_embeddings: false,
            generation: DescriptionGenerationConfig::default(),
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationReport {
    pub entities_processed: usize,
    pub records_written: usize,
}

/// Runs the full evaluation: loads the shard, then assembles and dispatches
/// every entity in order, writing to a [`SplitFileSink`] in `output_dir`.
pub fn run_evaluation(
    registry: &LanguageRegistry,
    source_tokenizer: &dyn SourceTokenizer,
    summary_tokenizer: Option<&dyn SummaryTokenizer>,
    model: &dyn DescriptionGenerator,
    config: &EvaluationConfig,
) -> Result<EvaluationReport, ArticleDescError> {
    let store = EntityRecordStore::load(registry, &config.data_dir, &config.split)?;
    info!(
        entities = store.len(),
        languages = registry.len(),
        split = config.split.as_str(),
        "loaded evaluation shard"
    );
    let mut sink = SplitFileSink::create(&config.output_dir)?;
    let report = evaluate_store(
        registry,
        &store,
        source_tokenizer,
        summary_tokenizer,
        model,
        config,
        &mut sink,
    )?;
    sink.flush()?;
    Ok(report)
}

/// Evaluates an already-loaded store against an arbitrary sink. Entities are
/// processed strictly in index order and, within an entity, target languages in
/// registry order, so the sink's streams stay index-aligned.
pub fn evaluate_store(
    registry: &LanguageRegistry,
    store: &EntityRecordStore,
    source_tokenizer: &dyn SourceTokenizer,
    summary_tokenizer: Option<&dyn SummaryTokenizer>,
    model: &dyn DescriptionGenerator,
    config: &EvaluationConfig,
    sink: &mut dyn PredictionSink,
) -> Result<EvaluationReport, ArticleDescError> {
    let assembler = BatchAssembler::new(
        registry,
        store,
        source_tokenizer,
        summary_tokenizer,
        config.use_graph_embeddings,
    );
    let dispatcher = GenerationDispatcher::new(registry, model, config.generation.clone());

    let mut records_written = 0;
    for entity_index in 0..store.len() {
        let batch = assembler.assemble(entity_index)?;
        let written = dispatcher.dispatch(store, entity_index, &batch, sink)?;
        records_written += written;
        debug!(entity_index, records = written, "entity dispatched");
    }
    Ok(EvaluationReport {
        entities_processed: store.len(),
        records_written,
    })
}
