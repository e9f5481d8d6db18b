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
use ndarray::Array1;
use std::collections::HashMap;

/// # Graph embedding resolver
///
/// Maps an entity's ontological type identifiers (e.g. Wikidata `P31` values) to
/// a single fixed-width embedding vector: the element-wise mean of the raw
/// per-type vectors that are known, or a corpus-wide fallback mean when none of
/// the entity's types have a known vector.
///
/// The output depends only on the type-to-vector mapping and the fallback, not
/// on the order identifiers are supplied in.
#[derive(Debug, Clone)]
pub struct GraphEmbeddingResolver {
    type_vectors: HashMap<String, Array1<f32>>,
    fallback: Array1<f32>,
}

impl GraphEmbeddingResolver {
    /// Creates a resolver whose fallback is the mean of all raw type vectors.
    ///
    /// Fails if `type_vectors` is empty (no mean can be formed) or if the raw
    /// vectors disagree on dimension.
    pub fn new(
        type_vectors: HashMap<String, Array1<f32>>,
    ) -> Result<GraphEmbeddingResolver, ArticleDescError> {
        if type_vectors.is_empty() {
            return Err(ArticleDescError::InvalidConfigurationError(
                "Cannot compute a corpus mean from an empty type embedding set".to_string(),
            ));
        }
        let dimension = validate_dimensions(&type_vectors)?;
        let mut fallback = Array1::<f32>::zeros(dimension);
        for vector in type_vectors.values() {
            fallback += vector;
        }
        fallback /= type_vectors.len() as f32;
        Ok(GraphEmbeddingResolver {
            type_vectors,
            fallback,
        })
    }

    /// Creates a resolver with an explicitly precomputed fallback vector,
    /// e.g. one shipped alongside the trained model.
    pub fn with_fallback(
        type_vectors: HashMap<String, Array1<f32>>,
        fallback: Array1<f32>,
    ) -> Result<GraphEmbeddingResolver, ArticleDescError> {
        if !type_vectors.is_empty() {
            let dimension = validate_dimensions(&type_vectors)?;
            if dimension != fallback.len() {
                return Err(ArticleDescError::InvalidConfigurationError(format!(
                    "Fallback embedding dimension {} does not match type embeddings ({})",
                    fallback.len(),
                    dimension
                )));
            }
        }
        Ok(GraphEmbeddingResolver {
            type_vectors,
            fallback,
        })
    }

    /// Embedding dimension produced by this resolver.
    pub fn dimension(&self) -> usize {
        self.fallback.len()
    }

    /// Resolves an entity's type identifiers into one vector. Identifiers with
    /// no known vector are skipped; if none resolve, the fallback is returned.
    pub fn resolve<S: AsRef<str>>(&self, type_ids: &[S]) -> Array1<f32> {
        let resolved: Vec<&Array1<f32>> = type_ids
            .iter()
            .filter_map(|type_id| self.type_vectors.get(type_id.as_ref()))
            .collect();
        if resolved.is_empty() {
            return self.fallback.clone();
        }
        let mut mean = Array1::<f32>::zeros(self.dimension());
        for vector in &resolved {
            mean += *vector;
        }
        mean / resolved.len() as f32
    }

    /// The corpus-wide fallback mean vector.
    pub fn fallback(&self) -> &Array1<f32> {
        &self.fallback
    }
}

fn validate_dimensions(
    type_vectors: &HashMap<String, Array1<f32>>,
) -> Result<usize, ArticleDescError> {
    let mut dimension = None;
    for (type_id, vector) in type_vectors {
        match dimension {
            None => dimension = Some(vector.len()),
            Some(dimension) if dimension != vector.len() => {
                return Err(ArticleDescError::InvalidConfigurationError(format!(
                    "Type embedding {} has dimension {}, expected {}",
                    type_id,
                    vector.len(),
                    dimension
                )));
            }
            _ => {}
        }
    }
    dimension.ok_or_else(|| {
        ArticleDescError::InvalidConfigurationError("Empty type embedding set".to_string())
    })
}
