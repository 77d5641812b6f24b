//! Web search client.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::SearchConfig;
use parley_core::SearchResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SearchError;

/// A source of ranked web results.
///
/// Search is best-effort: implementations return an empty vector on any
/// failure instead of an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one search, returning at most `max_results` hits in rank order.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl From<TavilyResult> for SearchResult {
    fn from(r: TavilyResult) -> Self {
        SearchResult {
            title: r.title,
            url: r.url,
            content: r.content,
            relevance_score: r.score,
        }
    }
}

/// Tavily-compatible search client.
pub struct TavilySearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    search_depth: String,
}

impl TavilySearchClient {
    /// Build a client from the `[search]` config section.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            search_depth: config.search_depth.clone(),
        })
    }

    /// Run the request and surface every failure as a typed error.
    pub async fn try_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if self.api_key.trim().is_empty() {
            return Err(SearchError::MissingApiKey);
        }

        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: &self.search_depth,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::MalformedBody(e.to_string()))?;

        let mut results: Vec<SearchResult> =
            parsed.results.into_iter().map(SearchResult::from).collect();
        results.truncate(max_results);
        Ok(results)
    }
}

#[async_trait]
impl SearchProvider for TavilySearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        debug!(query_len = query.len(), max_results, "Searching the web");
        match self.try_search(query, max_results).await {
            Ok(results) => {
                info!(results = results.len(), "Search completed");
                results
            }
            Err(e) => {
                warn!(error = %e, "Search failed, continuing without web context");
                Vec::new()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
