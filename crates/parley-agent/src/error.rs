//! Error types for the orchestrator.

use parley_core::ActivityState;
use parley_voice::VoiceError;

/// Reasons a request to the orchestrator was refused or failed.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("query exceeds maximum length of {0} characters")]
    QueryTooLong(usize),
    #[error("service busy, a request is already in progress")]
    Busy,
    #[error("voice input is not available")]
    VoiceUnavailable,
    #[error("invalid activity transition: {from} -> {to}")]
    InvalidTransition {
        from: ActivityState,
        to: ActivityState,
    },
    #[error(transparent)]
    Voice(#[from] VoiceError),
}
