//! Error types for retrieval and generation.

use std::time::Duration;

/// Failures of a single search request.
///
/// Never crosses the [`SearchProvider`](crate::search::SearchProvider)
/// boundary: the client logs it and yields an empty result set.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search API key is not configured")]
    MissingApiKey,
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search provider returned status {0}")]
    Status(u16),
    #[error("malformed search response: {0}")]
    MalformedBody(String),
}

/// Failures of the completion provider.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("completion API key is not configured")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion provider is rate limiting requests")]
    RateLimited,
    #[error("completion provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    MalformedBody(String),
    #[error("completion provider returned no content")]
    EmptyResponse,
    #[error("completion stream failed: {0}")]
    Stream(String),
}

/// Failures of a full query-to-answer run.
///
/// Search never appears here; a failed search only degrades the context.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("generation did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}
