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

use rust_tokenizers::error::TokenizerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArticleDescError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    /// Malformed or misaligned dataset shard. Fatal for the batch driver, which
    /// has no partial-recovery mode.
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Generation error: {0}")]
    GenerationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid caller-supplied request arguments.
    #[error("Value error: {0}")]
    ValueError(String),
}

impl From<std::io::Error> for ArticleDescError {
    fn from(error: std::io::Error) -> Self {
        ArticleDescError::IOError(error.to_string())
    }
}

impl From<TokenizerError> for ArticleDescError {
    fn from(error: TokenizerError) -> Self {
        ArticleDescError::TokenizerError(error.to_string())
    }
}

impl From<reqwest::Error> for ArticleDescError {
    fn from(error: reqwest::Error) -> Self {
        ArticleDescError::NetworkError(error.to_string())
    }
}
