//! Search provider client

use async_trait::async_trait;
use quarry_core::{Error, Result, SearchResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One-shot query against the web-search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run `query` and return up to `max_results` ranked results
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// reqwest-backed provider against a JSON search API
pub struct HttpSearchProvider {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpSearchProvider {
    /// Create a provider for `endpoint` (the full search URL)
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::search(format!("failed to build http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!(query = %query, max_results, "executing search");

        let mut builder = self.http.post(&self.endpoint).json(&SearchRequestBody {
            query,
            max_results,
        });
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::search(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::search(format!("search backend returned {status}")));
        }

        let body: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| Error::search(format!("failed to parse search response: {e}")))?;

        Ok(body.results)
    }
}
