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
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Cross-lingual record of one entity fetched from Wikidata: existing short
/// descriptions and sitelink page titles per language code, plus the entity's
/// ontological type identifiers (instance-of claims).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WikidataInfo {
    pub descriptions: HashMap<String, String>,
    pub sitelinks: HashMap<String, String>,
    pub type_ids: Vec<String>,
}

/// Capability boundary around the encyclopedia and Wikidata HTTP APIs.
///
/// `first_paragraph` and `ground_truth` degrade on failure (empty string and
/// `None` respectively) rather than erroring: a failing fetch for one language
/// must never abort a request.
#[async_trait]
pub trait WikiClient: Send + Sync {
    /// Descriptions, sitelinks and type claims for the entity behind
    /// `(lang, title)`.
    async fn entity_info(&self, lang: &str, title: &str)
        -> Result<WikidataInfo, ArticleDescError>;

    /// Plain-text lead paragraph of the article; empty string on any failure.
    async fn first_paragraph(&self, lang: &str, title: &str) -> String;

    /// Existing article description (ground truth); `None` on any failure.
    async fn ground_truth(&self, lang: &str, title: &str) -> Option<String>;

    /// Redirect-resolved canonical page title; `Ok(None)` when the page does
    /// not exist on the given language's encyclopedia.
    async fn canonical_title(
        &self,
        lang: &str,
        title: &str,
    ) -> Result<Option<String>, ArticleDescError>;
}

/// [`WikiClient`] backed by the MediaWiki action API and the REST summary
/// endpoint, with an explicit per-request timeout.
pub struct MediaWikiClient {
    http: reqwest::Client,
    supported_codes: Vec<String>,
}

impl MediaWikiClient {
    pub fn new(
        user_agent: &str,
        supported_codes: Vec<String>,
    ) -> Result<MediaWikiClient, ArticleDescError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(MediaWikiClient {
            http,
            supported_codes,
        })
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ArticleDescError> {
        Ok(self.http.get(url).query(query).send().await?.json().await?)
    }
}

#[async_trait]
impl WikiClient for MediaWikiClient {
    async fn entity_info(
        &self,
        lang: &str,
        title: &str,
    ) -> Result<WikidataInfo, ArticleDescError> {
        let sites = format!("{}wiki", lang);
        let languages = self.supported_codes.join("|");
        let sitefilter = self
            .supported_codes
            .iter()
            .map(|code| format!("{}wiki", code))
            .collect::<Vec<String>>()
            .join("|");
        let result = self
            .get_json(
                "https://www.wikidata.org/w/api.php",
                &[
                    ("action", "wbgetentities"),
                    ("sites", sites.as_str()),
                    ("titles", title),
                    ("redirects", "yes"),
                    ("props", "descriptions|claims|sitelinks"),
                    ("languages", languages.as_str()),
                    ("sitefilter", sitefilter.as_str()),
                    ("format", "json"),
                    ("formatversion", "2"),
                ],
            )
            .await?;

        let mut info = WikidataInfo::default();
        let entity = match result
            .get("entities")
            .and_then(Value::as_object)
            .and_then(|entities| entities.values().next())
        {
            Some(entity) => entity,
            None => return Ok(info),
        };

        if let Some(descriptions) = entity.get("descriptions").and_then(Value::as_object) {
            for (code, description) in descriptions {
                if let Some(value) = description.get("value").and_then(Value::as_str) {
                    info.descriptions.insert(code.clone(), value.to_string());
                }
            }
        }
        if let Some(sitelinks) = entity.get("sitelinks").and_then(Value::as_object) {
            for (wiki, sitelink) in sitelinks {
                let code = match wiki.strip_suffix("wiki") {
                    Some(code) => code,
                    None => continue,
                };
                if let Some(page_title) = sitelink.get("title").and_then(Value::as_str) {
                    info.sitelinks.insert(code.to_string(), page_title.to_string());
                }
            }
        }
        if let Some(claims) = entity
            .get("claims")
            .and_then(|claims| claims.get("P31"))
            .and_then(Value::as_array)
        {
            for claim in claims {
                if let Some(type_id) = claim
                    .get("mainsnak")
                    .and_then(|snak| snak.get("datavalue"))
                    .and_then(|datavalue| datavalue.get("value"))
                    .and_then(|value| value.get("id"))
                    .and_then(Value::as_str)
                {
                    info.type_ids.push(type_id.to_string());
                }
            }
        }
        Ok(info)
    }

    async fn first_paragraph(&self, lang: &str, title: &str) -> String {
        let url = format!(
            "https://{}.wikipedia.org/api/rest_v1/page/summary/{}",
            lang, title
        );
        match self.get_json(&url, &[]).await {
            Ok(result) => result
                .get("extract")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(_) => String::new(),
        }
    }

    async fn ground_truth(&self, lang: &str, title: &str) -> Option<String> {
        let url = format!("https://{}.wikipedia.org/w/api.php", lang);
        // English has a prop taking local short-description overrides into
        // account that other languages don't
        if lang == "en" {
            let result = self
                .get_json(
                    &url,
                    &[
                        ("action", "query"),
                        ("prop", "pageprops"),
                        ("titles", title),
                        ("redirects", ""),
                        ("format", "json"),
                        ("formatversion", "2"),
                    ],
                )
                .await
                .ok()?;
            result
                .get("query")?
                .get("pages")?
                .get(0)?
                .get("pageprops")?
                .get("wikibase-shortdesc")?
                .as_str()
                .map(str::to_string)
        } else {
            let result = self
                .get_json(
                    &url,
                    &[
                        ("action", "query"),
                        ("prop", "pageterms"),
                        ("titles", title),
                        ("redirects", ""),
                        ("wbptterms", "description"),
                        ("wbptlanguage", lang),
                        ("format", "json"),
                        ("formatversion", "2"),
                    ],
                )
                .await
                .ok()?;
            result
                .get("query")?
                .get("pages")?
                .get(0)?
                .get("terms")?
                .get("description")?
                .get(0)?
                .as_str()
                .map(str::to_string)
        }
    }

    async fn canonical_title(
        &self,
        lang: &str,
        title: &str,
    ) -> Result<Option<String>, ArticleDescError> {
        let url = format!("https://{}.wikipedia.org/w/api.php", lang);
        let result = self
            .get_json(
                &url,
                &[
                    ("action", "query"),
                    ("prop", "info"),
                    ("redirects", ""),
                    ("titles", title),
                    ("format", "json"),
                    ("formatversion", "2"),
                ],
            )
            .await?;
        let page = result
            .get("query")
            .and_then(|query| query.get("pages"))
            .and_then(|pages| pages.get(0))
            .ok_or_else(|| {
                ArticleDescError::NetworkError(format!(
                    "Malformed page info response for {}:{}",
                    lang, title
                ))
            })?;
        if page.get("missing").is_some() {
            return Ok(None);
        }
        Ok(page
            .get("title")
            .and_then(Value::as_str)
            .map(|canonical| canonical.replace(' ', "_")))
    }
}
