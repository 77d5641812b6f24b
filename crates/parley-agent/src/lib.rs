//! Turn orchestration for Parley.
//!
//! The [`AgentOrchestrator`] accepts typed or spoken queries, runs them
//! through the retrieval pipeline one at a time, records the conversation,
//! narrates answers, and drives the activity state shown by the avatar.

pub mod conversation;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod state;
pub mod ticket;

pub use conversation::Conversation;
pub use error::AgentError;
pub use events::AgentEvent;
pub use orchestrator::{AgentOrchestrator, AgentSettings, ListenOutcome, TurnOutcome};
pub use state::ActivityMachine;
pub use ticket::{QueryGate, QueryTicket};
