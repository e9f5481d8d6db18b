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
use rust_tokenizers::tokenizer::{BertTokenizer, MBart50Tokenizer, Tokenizer, TruncationStrategy};
use std::path::Path;

/// Token ids and the matching attention mask for one encoded text.
/// Both vectors always have equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEncoding {
    pub token_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl TokenEncoding {
    /// Wraps token ids with an all-ones attention mask.
    pub fn new(token_ids: Vec<i64>) -> TokenEncoding {
        let attention_mask = vec![1; token_ids.len()];
        TokenEncoding {
            token_ids,
            attention_mask,
        }
    }

    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// Locale-conditioned tokenization of source (lead) text. The tokenizer
/// vocabulary is a capability boundary: implementations own their vocabulary
/// files and special-token conventions.
pub trait SourceTokenizer: Send + Sync {
    /// Encodes `text` with `src_locale` as the tokenizer's source-language
    /// context. Failures propagate: malformed source text is a data problem to
    /// surface, not mask.
    fn encode(&self, text: &str, src_locale: &str) -> Result<TokenEncoding, ArticleDescError>;
}

/// Tokenization of target-description text for the auxiliary summary channel.
pub trait SummaryTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<TokenEncoding, ArticleDescError>;
}

/// [`SourceTokenizer`] backed by the MBart50 sentencepiece tokenizer. The
/// source language is conveyed with the `>>locale<< ` prefix convention used
/// by the multilingual MBart checkpoints.
pub struct MBart50SourceTokenizer {
    tokenizer: MBart50Tokenizer,
    max_length: usize,
}

impl MBart50SourceTokenizer {
    pub fn from_file<P: AsRef<Path>>(
        vocab_path: P,
    ) -> Result<MBart50SourceTokenizer, ArticleDescError> {
        let tokenizer = MBart50Tokenizer::from_file(path_str(vocab_path.as_ref())?, false)?;
        Ok(MBart50SourceTokenizer {
            tokenizer,
            max_length: 512,
        })
    }

    pub fn with_max_length(mut self, max_length: usize) -> MBart50SourceTokenizer {
        self.max_length = max_length;
        self
    }
}

impl SourceTokenizer for MBart50SourceTokenizer {
    fn encode(&self, text: &str, src_locale: &str) -> Result<TokenEncoding, ArticleDescError> {
        let prefixed = format!(">>{}<< {}", src_locale, text);
        let tokenized = self.tokenizer.encode(
            &prefixed,
            None,
            self.max_length,
            &TruncationStrategy::LongestFirst,
            0,
        );
        Ok(TokenEncoding::new(tokenized.token_ids))
    }
}

/// [`SummaryTokenizer`] backed by a BERT wordpiece tokenizer, used to encode
/// existing cross-lingual descriptions for the summary embedding channel.
pub struct BertSummaryTokenizer {
    tokenizer: BertTokenizer,
    max_length: usize,
}

impl BertSummaryTokenizer {
    pub fn from_file<P: AsRef<Path>>(
        vocab_path: P,
        lower_case: bool,
    ) -> Result<BertSummaryTokenizer, ArticleDescError> {
        let tokenizer = BertTokenizer::from_file(path_str(vocab_path.as_ref())?, lower_case, false)?;
        Ok(BertSummaryTokenizer {
            tokenizer,
            max_length: 512,
        })
    }

    pub fn with_max_length(mut self, max_length: usize) -> BertSummaryTokenizer {
        self.max_length = max_length;
        self
    }
}

impl SummaryTokenizer for BertSummaryTokenizer {
    fn encode(&self, text: &str) -> Result<TokenEncoding, ArticleDescError> {
        let tokenized = self.tokenizer.encode(
            text,
            None,
            self.max_length,
            &TruncationStrategy::LongestFirst,
            0,
        );
        Ok(TokenEncoding::new(tokenized.token_ids))
    }
}

fn path_str(path: &Path) -> Result<&str, ArticleDescError> {
    path.to_str().ok_or_else(|| {
        ArticleDescError::InvalidConfigurationError(format!(
            "Vocabulary path is not valid UTF-8: {}",
            path.display()
        ))
    })
}
