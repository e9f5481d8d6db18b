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
use crate::pipelines::corpus::EntityRecordStore;
use crate::pipelines::languages::LanguageRegistry;
use crate::pipelines::tokenization::{SourceTokenizer, SummaryTokenizer, TokenEncoding};
use ndarray::Array1;
use std::collections::HashMap;
use std::sync::Arc;

/// # Entity batch
///
/// Ephemeral aggregate holding everything the model needs for one entity.
/// Absence is a typed state throughout, never a missing key:
/// `source_encodings` carries one entry for every configured language, with
/// `None` recording that the entity has no article in that language;
/// the graph vector and the summary map are optional as a whole, reflecting
/// the configuration flags that enable those channels.
///
/// The summary encodings are shared (`Arc`) so that per-target specialization
/// ([`EntityBatch::for_target`]) is a shallow copy.
#[derive(Debug, Clone)]
pub struct EntityBatch {
    /// Tokenized lead text per configured language; `None` marks an explicitly
    /// recorded absence.
    pub source_encodings: HashMap<String, Option<Arc<TokenEncoding>>>,
    /// Single-row graph embedding, present iff the graph channel is enabled.
    pub graph_embedding: Option<Array1<f32>>,
    /// Summary encoding per valid target language, present iff the summary
    /// channel is enabled.
    pub summary_encodings: Option<HashMap<String, Arc<TokenEncoding>>>,
    /// Valid generation targets for this entity, in registry order.
    pub target_languages: Vec<String>,
}

impl EntityBatch {
    /// Specializes the batch for one generation call: identical to `self`,
    /// except that the target language's own summary encoding is removed so the
    /// model cannot see the description it is asked to generate. The shared
    /// batch is never mutated.
    pub fn for_target(&self, target_code: &str) -> EntityBatch {
        let mut specialized = self.clone();
        if let Some(summary_encodings) = specialized.summary_encodings.as_mut() {
            summary_encodings.remove(target_code);
        }
        specialized
    }

    /// Languages with a present source encoding.
    pub fn available_languages(&self) -> Vec<&str> {
        self.source_encodings
            .iter()
            .filter(|(_, encoding)| encoding.is_some())
            .map(|(code, _)| code.as_str())
            .collect()
    }
}

/// # Batch assembler
///
/// Builds one [`EntityBatch`] per entity index from the record store: tokenized
/// source encodings for every language with an article, the entity's graph
/// embedding when the graph channel is enabled, and summary encodings of the
/// ground-truth descriptions for every valid target language when the summary
/// channel is enabled.
pub struct BatchAssembler<'a> {
    registry: &'a LanguageRegistry,
    store: &'a EntityRecordStore,
    source_tokenizer: &'a dyn SourceTokenizer,
    summary_tokenizer: Option<&'a dyn SummaryTokenizer>,
    use_graph_embeddings: bool,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(
        registry: &'a LanguageRegistry,
        store: &'a EntityRecordStore,
        source_tokenizer: &'a dyn SourceTokenizer,
        summary_tokenizer: Option<&'a dyn SummaryTokenizer>,
        use_graph_embeddings: bool,
    ) -> BatchAssembler<'a> {
        BatchAssembler {
            registry,
            store,
            source_tokenizer,
            summary_tokenizer,
            use_graph_embeddings,
        }
    }

    /// Assembles the batch for one entity. Tokenization failures propagate:
    /// they are fatal for the entity rather than silently skipped.
    pub fn assemble(&self, entity_index: usize) -> Result<EntityBatch, ArticleDescError> {
        let mut source_encodings = HashMap::with_capacity(self.registry.len());
        for (code, locale) in self.registry.iter() {
            let encoding = match self.store.source(code, entity_index) {
                Some(text) => Some(Arc::new(self.source_tokenizer.encode(text, locale)?)),
                None => None,
            };
            source_encodings.insert(code.to_string(), encoding);
        }

        let target_languages = self.store.target_languages(entity_index);

        let graph_embedding = if self.use_graph_embeddings {
            Some(self.store.graph_embedding(entity_index).to_owned())
        } else {
            None
        };

        let summary_encodings = match self.summary_tokenizer {
            Some(summary_tokenizer) => {
                let mut encodings = HashMap::with_capacity(target_languages.len());
                for code in &target_languages {
                    let text = self.store.target(code, entity_index).ok_or_else(|| {
                        ArticleDescError::DataError(format!(
                            "Target language {} has no text at index {}",
                            code, entity_index
                        ))
                    })?;
                    encodings.insert(code.clone(), Arc::new(summary_tokenizer.encode(text)?));
                }
                Some(encodings)
            }
            None => None,
        };

        Ok(EntityBatch {
            source_encodings,
            graph_embedding,
            summary_encodings,
            target_languages,
        })
    }
}
