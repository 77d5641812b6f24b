//! Query-to-answer pipeline: search, assemble, generate.

use std::sync::Arc;
use std::time::Duration;

use parley_core::{ParleyConfig, SearchResult};
use tracing::{info, warn};

use crate::context::{assemble_context, truncate_content};
use crate::error::PipelineError;
use crate::generation::CompletionProvider;
use crate::search::SearchProvider;

/// Tunables for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_results: usize,
    pub max_content_chars: usize,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            max_results: config.search.max_results,
            max_content_chars: config.search.max_content_chars,
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

/// Retrieval-augmented answering over injected providers.
///
/// Search failures degrade the context; only generation can fail a run.
pub struct RagPipeline {
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    settings: PipelineSettings,
}

impl RagPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            search,
            completion,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer `query` in one round trip.
    pub async fn answer(&self, query: &str) -> Result<String, PipelineError> {
        let context = self.grounding_context(query).await;
        let deadline = self.settings.generation_timeout;

        let text = tokio::time::timeout(deadline, self.completion.generate(query, &context))
            .await
            .map_err(|_| PipelineError::DeadlineExceeded(deadline))??;

        info!(answer_len = text.len(), "Pipeline answered");
        Ok(text)
    }

    /// Answer `query` incrementally, forwarding each chunk to `on_chunk`.
    ///
    /// Returns the concatenation of every chunk delivered.
    pub async fn answer_streaming(
        &self,
        query: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String, PipelineError> {
        let context = self.grounding_context(query).await;
        let deadline = self.settings.generation_timeout;

        let mut text = String::new();
        let mut forward = |chunk: &str| {
            text.push_str(chunk);
            on_chunk(chunk);
        };

        tokio::time::timeout(
            deadline,
            self.completion
                .generate_streaming(query, &context, &mut forward),
        )
        .await
        .map_err(|_| PipelineError::DeadlineExceeded(deadline))??;

        info!(answer_len = text.len(), "Pipeline answered (streamed)");
        Ok(text)
    }

    async fn grounding_context(&self, query: &str) -> String {
        let results = self.search_with_deadline(query).await;
        let results = truncate_content(results, self.settings.max_content_chars);
        assemble_context(&results)
    }

    async fn search_with_deadline(&self, query: &str) -> Vec<SearchResult> {
        let deadline = self.settings.search_timeout;
        match tokio::time::timeout(
            deadline,
            self.search.search(query, self.settings.max_results),
        )
        .await
        {
            Ok(mut results) => {
                results.truncate(self.settings.max_results);
                results
            }
            Err(_) => {
                warn!(?deadline, "Search timed out, continuing without web context");
                Vec::new()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
