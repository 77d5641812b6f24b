//! Retrieval-augmented answering for Parley.
//!
//! Web search, context assembly, completion, and the pipeline that composes
//! them into one query-to-answer operation.

pub mod context;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod search;

pub use context::{assemble_context, truncate_content, NO_INFO_SENTINEL};
pub use error::{GenerationError, PipelineError, SearchError};
pub use generation::{
    build_messages, ChatTurn, CompletionProvider, OpenAiCompletionClient, SYSTEM_INSTRUCTIONS,
};
pub use pipeline::{PipelineSettings, RagPipeline};
pub use search::{SearchProvider, TavilySearchClient};
