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

//! # Description generation pipeline components
//!
//! The components of the batch-assembly and generation-dispatch pipeline,
//! leaf-first:
//!
//! - [`languages`]: bidirectional mapping between short language codes and full
//!   locale tags, preserving configuration order.
//! - [`corpus`]: read-only per-language parallel arrays loaded from a dataset
//!   shard, plus one graph embedding per entity.
//! - [`graph_embeddings`]: resolution of an entity's ontological types into a
//!   single mean embedding vector with a corpus-wide fallback.
//! - [`tokenization`]: locale-conditioned source tokenization and summary
//!   tokenization behind trait boundaries.
//! - [`batch`]: per-entity assembly of source encodings, graph vector and
//!   summary encodings into one heterogeneous [`batch::EntityBatch`].
//! - [`generation`]: the opaque model boundary and the per-target-language
//!   generation dispatch.
//! - [`output`]: aligned line-oriented prediction/reference/language outputs.
//! - [`evaluation`]: the sequential batch-evaluation driver tying it together.

pub mod batch;
pub mod corpus;
pub mod evaluation;
pub mod generation;
pub mod graph_embeddings;
pub mod languages;
pub mod output;
pub mod tokenization;
