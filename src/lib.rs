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

//! # Multilingual article description generation
//!
//! This crate implements the data fusion and orchestration layer of a multilingual
//! article description generator: for one entity, per-language article lead texts,
//! cross-lingual Wikidata descriptions, an optional graph embedding and optional
//! summary embeddings are normalized into a single heterogeneous batch, routed
//! through a shared sequence-to-sequence model with a language-conditioned decoder
//! start, and decoded with beam search.
//!
//! The generative model itself is a capability boundary: it is abstracted behind
//! the [`DescriptionGenerator`](crate::pipelines::generation::DescriptionGenerator)
//! trait (`generate` a batch into token id sequences, `decode` token ids into text)
//! so that the orchestration logic can be exercised with any backend, including
//! test stubs. Tokenizer vocabularies are a capability boundary as well, behind the
//! [`SourceTokenizer`](crate::pipelines::tokenization::SourceTokenizer) and
//! [`SummaryTokenizer`](crate::pipelines::tokenization::SummaryTokenizer) traits,
//! with `rust_tokenizers`-backed implementations provided.
//!
//! Two deployment shapes are covered:
//! - the batch evaluation driver
//!   ([`pipelines::evaluation`](crate::pipelines::evaluation)): a single-threaded
//!   sequential pass over a dataset shard, writing aligned prediction, reference
//!   and language files;
//! - the online service ([`service`](crate::service)): resolves a page title,
//!   fans out lead-text and ground-truth fetches over a bounded worker pool,
//!   assembles one batch and generates descriptions for the requested language.

pub mod common;
pub mod pipelines;
pub mod service;

pub use common::error::ArticleDescError;
