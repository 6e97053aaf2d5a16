//! OpenSearch/Elasticsearch client for the restaurant index.
//!
//! Issues a `match` query on the cuisine field and reads restaurant ids out of
//! each hit's `_source`. Authentication is HTTP basic auth.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{CandidateId, SearchIndex};
use crate::config::SearchConfig;
use crate::error::SearchError;

/// HTTP client for an OpenSearch-compatible restaurant index.
pub struct OpenSearchClient {
    /// HTTP client for making API requests.
    http_client: Client,
    /// Cluster endpoint, index and field names.
    config: SearchConfig,
}

impl OpenSearchClient {
    /// Creates a client for the given configuration.
    pub fn new(config: SearchConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    /// Creates a client from `DINING_SEARCH_*` environment variables.
    pub fn from_env() -> Result<Self, crate::config::ConfigError> {
        Ok(Self::new(SearchConfig::from_env()?))
    }

    /// Returns the `_search` URL of the configured index.
    pub fn search_url(&self) -> String {
        format!(
            "{}/{}/_search",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index
        )
    }

    /// Builds the query body for a cuisine.
    pub fn build_query(&self, cuisine: &str) -> Value {
        let mut matcher = Map::new();
        matcher.insert(
            self.config.cuisine_field.clone(),
            Value::String(cuisine.to_string()),
        );
        json!({
            "query": { "match": matcher },
            "size": self.config.max_hits,
        })
    }

    fn basic_auth_header(&self) -> Option<String> {
        let user = self.config.username.as_deref()?;
        let password = self.config.password.as_deref().unwrap_or_default();
        Some(format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", user, password))
        ))
    }
}

/// Internal response structure of `_search`.
#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    hits: ApiHits,
}

#[derive(Debug, Deserialize)]
struct ApiHits {
    #[serde(default)]
    hits: Vec<ApiHit>,
}

#[derive(Debug, Deserialize)]
struct ApiHit {
    #[serde(rename = "_source", default)]
    source: Value,
}

/// Extracts ids from hits in order, skipping hits without a usable id.
fn extract_candidate_ids(response: &ApiSearchResponse, id_field: &str) -> Vec<CandidateId> {
    response
        .hits
        .hits
        .iter()
        .filter_map(|hit| match hit.source.get(id_field) {
            Some(Value::String(id)) if !id.is_empty() => Some(CandidateId::new(id.as_str())),
            Some(Value::Number(id)) => Some(CandidateId::new(id.to_string())),
            _ => {
                tracing::debug!(field = id_field, "Skipping search hit without restaurant id");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    async fn search(&self, cuisine: &str) -> Result<Vec<CandidateId>, SearchError> {
        let mut request = self
            .http_client
            .post(self.search_url())
            .header("Content-Type", "application/json")
            .json(&self.build_query(cuisine));

        if let Some(auth) = self.basic_auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SearchError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %message, "Search index returned error");
            return Err(SearchError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ApiSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        Ok(extract_candidate_ids(&parsed, &self.config.id_field))
    }
}
