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
use crate::pipelines::languages::LanguageRegistry;
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Sentinel line marking the absence of an article (or description) for an
/// entity in a given language within a dataset shard.
pub const NO_ARTICLE_SENTINEL: &str = "no article";

/// # Entity record store
///
/// Read-only view over one dataset shard: for every configured language, the
/// line-aligned `<split>.source<code>` and `<split>.target<code>` files, plus
/// the `<split>.embd` file carrying one space-separated graph embedding per
/// entity. Index `i` refers to the same entity across every array.
///
/// The sentinel line `"no article"` is mapped to a typed absence (`None`) at
/// load time. Misaligned array lengths, unparseable embedding components or a
/// non-uniform embedding dimension are rejected on load: the batch driver has
/// no partial-recovery mode.
#[derive(Debug)]
pub struct EntityRecordStore {
    languages: Vec<String>,
    sources: HashMap<String, Vec<Option<String>>>,
    targets: HashMap<String, Vec<Option<String>>>,
    graph_embeddings: Array2<f32>,
}

impl EntityRecordStore {
    /// Loads the shard for `split` (e.g. `"test"`) from `data_dir`, covering
    /// every language in the registry.
    pub fn load<P: AsRef<Path>>(
        registry: &LanguageRegistry,
        data_dir: P,
        split: &str,
    ) -> Result<EntityRecordStore, ArticleDescError> {
        let data_dir = data_dir.as_ref();
        let graph_embeddings = read_embedding_file(&data_dir.join(format!("{}.embd", split)))?;
        let num_entities = graph_embeddings.nrows();

        let mut sources = HashMap::new();
        let mut targets = HashMap::new();
        for code in registry.codes() {
            let source_path = data_dir.join(format!("{}.source{}", split, code));
            let target_path = data_dir.join(format!("{}.target{}", split, code));
            let source_lines = read_text_file(&source_path)?;
            let target_lines = read_text_file(&target_path)?;
            for (path, lines) in [(&source_path, &source_lines), (&target_path, &target_lines)] {
                if lines.len() != num_entities {
                    return Err(ArticleDescError::DataError(format!(
                        "Misaligned shard: {} has {} lines, embedding file has {}",
                        path.display(),
                        lines.len(),
                        num_entities
                    )));
                }
            }
            sources.insert(code.clone(), source_lines);
            targets.insert(code.clone(), target_lines);
        }

        Ok(EntityRecordStore {
            languages: registry.codes().to_vec(),
            sources,
            targets,
            graph_embeddings,
        })
    }

    /// Builds a store directly from in-memory arrays, validating alignment.
    /// Every per-language array and the embedding array must have equal length.
    pub fn from_parts(
        languages: Vec<String>,
        sources: HashMap<String, Vec<Option<String>>>,
        targets: HashMap<String, Vec<Option<String>>>,
        graph_embeddings: Array2<f32>,
    ) -> Result<EntityRecordStore, ArticleDescError> {
        let num_entities = graph_embeddings.nrows();
        for code in &languages {
            let source_len = sources.get(code).map(|lines| lines.len());
            let target_len = targets.get(code).map(|lines| lines.len());
            if source_len != Some(num_entities) || target_len != Some(num_entities) {
                return Err(ArticleDescError::DataError(format!(
                    "Misaligned shard for language {}: source {:?}, target {:?}, embeddings {}",
                    code, source_len, target_len, num_entities
                )));
            }
        }
        Ok(EntityRecordStore {
            languages,
            sources,
            targets,
            graph_embeddings,
        })
    }

    /// Number of entities in the shard.
    pub fn len(&self) -> usize {
        self.graph_embeddings.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Languages covered by this shard, in registry order.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Native-language lead text for an entity, `None` when the shard recorded
    /// the no-article sentinel.
    pub fn source(&self, code: &str, index: usize) -> Option<&str> {
        self.sources
            .get(code)
            .and_then(|lines| lines.get(index))
            .and_then(|line| line.as_deref())
    }

    /// Ground-truth description for an entity, `None` for the sentinel.
    pub fn target(&self, code: &str, index: usize) -> Option<&str> {
        self.targets
            .get(code)
            .and_then(|lines| lines.get(index))
            .and_then(|line| line.as_deref())
    }

    /// Graph embedding row for an entity.
    pub fn graph_embedding(&self, index: usize) -> ArrayView1<f32> {
        self.graph_embeddings.row(index)
    }

    /// Languages that are valid generation targets for an entity: those whose
    /// target text at `index` is not the sentinel. Registry order.
    pub fn target_languages(&self, index: usize) -> Vec<String> {
        self.languages
            .iter()
            .filter(|code| self.target(code, index).is_some())
            .cloned()
            .collect()
    }
}

fn read_text_file(path: &Path) -> Result<Vec<Option<String>>, ArticleDescError> {
    let file = File::open(path).map_err(|error| {
        ArticleDescError::IOError(format!("{}: {}", path.display(), error))
    })?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line == NO_ARTICLE_SENTINEL {
            lines.push(None);
        } else {
            lines.push(Some(line.to_string()));
        }
    }
    Ok(lines)
}

fn read_embedding_file(path: &Path) -> Result<Array2<f32>, ArticleDescError> {
    let file = File::open(path).map_err(|error| {
        ArticleDescError::IOError(format!("{}: {}", path.display(), error))
    })?;
    let mut rows: Vec<Array1<f32>> = Vec::new();
    let mut dimension: Option<usize> = None;
    for (line_index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let components = line
            .split_whitespace()
            .map(|component| component.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|error| {
                ArticleDescError::DataError(format!(
                    "{} line {}: invalid embedding component: {}",
                    path.display(),
                    line_index + 1,
                    error
                ))
            })?;
        match dimension {
            None => dimension = Some(components.len()),
            Some(dimension) if dimension != components.len() => {
                return Err(ArticleDescError::DataError(format!(
                    "{} line {}: embedding dimension {} does not match {}",
                    path.display(),
                    line_index + 1,
                    components.len(),
                    dimension
                )));
            }
            _ => {}
        }
        rows.push(Array1::from(components));
    }
    let dimension = dimension.unwrap_or(0);
    let mut array = Array2::zeros((rows.len(), dimension));
    for (row_index, row) in rows.iter().enumerate() {
        array.row_mut(row_index).assign(row);
    }
    Ok(array)
}
