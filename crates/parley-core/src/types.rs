use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// What the agent is doing right now, as shown by the avatar.
///
/// Exactly one state is live at a time. The orchestrator owns the value and
/// is the only component that changes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Waiting for input.
    #[default]
    Idle,
    /// Capturing the user's voice.
    Listening,
    /// Searching and generating an answer.
    Thinking,
    /// Reading the answer aloud.
    Speaking,
    /// Brief display after a successful turn.
    Happy,
    /// Brief display after a failed turn or capture error.
    Confused,
}

impl ActivityState {
    /// All states, in declaration order.
    pub const ALL: [ActivityState; 6] = [
        ActivityState::Idle,
        ActivityState::Listening,
        ActivityState::Thinking,
        ActivityState::Speaking,
        ActivityState::Happy,
        ActivityState::Confused,
    ];
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Idle => write!(f, "Idle"),
            ActivityState::Listening => write!(f, "Listening"),
            ActivityState::Thinking => write!(f, "Thinking"),
            ActivityState::Speaking => write!(f, "Speaking"),
            ActivityState::Happy => write!(f, "Happy"),
            ActivityState::Confused => write!(f, "Confused"),
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// A single transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    /// Set only on the placeholder shown while a query is in flight.
    #[serde(default)]
    pub is_loading: bool,
}

impl Message {
    /// A message typed or spoken by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true, false)
    }

    /// A message produced by the agent.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(text, false, false)
    }

    /// The transient placeholder for an in-flight query.
    pub fn loading(text: impl Into<String>) -> Self {
        Self::new(text, false, true)
    }

    fn new(text: impl Into<String>, is_user: bool, is_loading: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user,
            timestamp: Utc::now(),
            is_loading,
        }
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// One ranked web-search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    /// Provider-assigned relevance (0.0 to 1.0 for Tavily).
    pub relevance_score: f64,
}

// =============================================================================
// Avatar
// =============================================================================

/// Everything the avatar renderer consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarView {
    pub state: ActivityState,
    pub is_listening: bool,
    pub is_speaking: bool,
}

impl AvatarView {
    /// Derive the view from the activity state alone.
    pub fn from_state(state: ActivityState) -> Self {
        Self {
            state,
            is_listening: state == ActivityState::Listening,
            is_speaking: state == ActivityState::Speaking,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
