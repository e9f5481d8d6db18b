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
use std::collections::HashMap;

/// # Language registry
///
/// Bidirectional mapping between short language codes (`en`) and the full locale
/// tags used when addressing the tokenizer and model (`en_XX`), built from a
/// comma-separated configuration string of locale tags. The short code is the
/// first two characters of the tag. Configuration order is preserved and defines
/// the canonical iteration order everywhere in the pipeline.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    codes: Vec<String>,
    code_to_locale: HashMap<String, String>,
    locale_to_code: HashMap<String, String>,
}

impl LanguageRegistry {
    /// Builds a registry from a comma-separated list of locale tags, e.g.
    /// `"en_XX,fr_XX,de_DE"`.
    ///
    /// Two distinct locale tags reducing to the same two-character prefix are a
    /// configuration error: silently collapsing them would reroute one language's
    /// data through another's.
    pub fn from_locales(locales: &str) -> Result<LanguageRegistry, ArticleDescError> {
        let mut codes = Vec::new();
        let mut code_to_locale = HashMap::new();
        let mut locale_to_code = HashMap::new();
        for locale in locales.trim().split(',') {
            let locale = locale.trim();
            // get(..2) is None for tags shorter than two bytes and for tags
            // whose first two bytes do not fall on a char boundary
            let code = match locale.get(..2) {
                Some(code) => code.to_string(),
                None => {
                    return Err(ArticleDescError::InvalidConfigurationError(format!(
                        "Cannot derive a two-character language code from locale tag {:?}",
                        locale
                    )))
                }
            };
            if let Some(previous) = code_to_locale.get(&code) {
                return Err(ArticleDescError::InvalidConfigurationError(format!(
                    "Language code {} is ambiguous: derived from both {} and {}",
                    code, previous, locale
                )));
            }
            code_to_locale.insert(code.clone(), locale.to_string());
            locale_to_code.insert(locale.to_string(), code.clone());
            codes.push(code);
        }
        Ok(LanguageRegistry {
            codes,
            code_to_locale,
            locale_to_code,
        })
    }

    /// Locale tag for a short language code.
    pub fn locale(&self, code: &str) -> Option<&str> {
        self.code_to_locale.get(code).map(|value| value.as_str())
    }

    /// Short language code for a locale tag.
    pub fn code_for_locale(&self, locale: &str) -> Option<&str> {
        self.locale_to_code.get(locale).map(|value| value.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.code_to_locale.contains_key(code)
    }

    /// Short codes in configuration order.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// `(code, locale)` pairs in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.codes
            .iter()
            .map(move |code| (code.as_str(), self.code_to_locale[code].as_str()))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
