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

//! HTTP surface of the description service.
//!
//! - `GET /article?lang=<code>&title=<title>&num_beams=<int>&num_return=<int>`
//! - `GET /supported-languages`
//!
//! Numeric parameters are parsed leniently: a malformed value falls back to
//! its default rather than rejecting the request, and every reply is HTTP 200.

use crate::common::error::ArticleDescError;
use crate::service::{DescriptionReply, DescriptionRequest, DescriptionService};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Builds the service router.
pub fn router(service: Arc<DescriptionService>) -> Router {
    Router::new()
        .route("/article", get(get_article))
        .route("/supported-languages", get(get_supported_languages))
        .with_state(service)
}

/// Binds and serves until the server errors or is shut down.
pub async fn serve(
    service: Arc<DescriptionService>,
    addr: SocketAddr,
) -> Result<(), ArticleDescError> {
    info!(%addr, "starting description service");
    axum::Server::bind(&addr)
        .serve(router(service).into_make_service())
        .await
        .map_err(|error| ArticleDescError::NetworkError(error.to_string()))
}

async fn get_article(
    State(service): State<Arc<DescriptionService>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<DescriptionReply> {
    Json(service.describe(request_from_params(&params)).await)
}

/// Lenient argument extraction: malformed numeric values fall back to their
/// defaults instead of failing the request.
fn request_from_params(params: &HashMap<String, String>) -> DescriptionRequest {
    DescriptionRequest {
        lang: params.get("lang").cloned(),
        title: params.get("title").cloned(),
        num_beams: params.get("num_beams").and_then(|value| value.parse().ok()),
        num_return: params.get("num_return").and_then(|value| value.parse().ok()),
    }
}

async fn get_supported_languages(
    State(service): State<Arc<DescriptionService>>,
) -> Json<Value> {
    Json(json!({ "languages": service.supported_codes() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_numeric_parameters_fall_back_to_defaults() {
        let mut params = HashMap::new();
        params.insert("lang".to_string(), "en".to_string());
        params.insert("title".to_string(), "Clandonald".to_string());
        params.insert("num_beams".to_string(), "many".to_string());
        params.insert("num_return".to_string(), "2".to_string());

        let request = request_from_params(&params);
        assert_eq!(request.lang.as_deref(), Some("en"));
        assert_eq!(request.num_beams, None);
        assert_eq!(request.num_return, Some(2));
    }
}
