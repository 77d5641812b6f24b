//! Notifications published to the UI.

use parley_core::{ActivityState, Message};
use uuid::Uuid;

/// Everything the front-end needs to stay in sync with the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    StateChanged {
        from: ActivityState,
        to: ActivityState,
    },
    MessageAppended(Message),
    /// The loading placeholder with this id was removed.
    MessageRemoved(Uuid),
    /// One increment of a streamed answer.
    Chunk(String),
    /// A dismissible notice, e.g. "busy" or a capture failure.
    Notice(String),
}
