//! The in-memory transcript.

use parley_core::Message;
use uuid::Uuid;

/// Ordered messages for the current session.
///
/// Messages are only ever appended; the single exception is the loading
/// placeholder, which is removed once its turn settles.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` and return a copy of it.
    pub fn append(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        message
    }

    /// Remove the loading placeholder with `id`.
    ///
    /// Returns `false` if there is no such message or it is not a
    /// placeholder.
    pub fn remove_loading(&mut self, id: Uuid) -> bool {
        match self.messages.iter().position(|m| m.id == id && m.is_loading) {
            Some(index) => {
                self.messages.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
