//! Append-only message log

use super::message::Message;

/// Ordered log of a session's messages.
///
/// Insertion order is display order. There is no removal or mutation API.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end of the log
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Full ordered view
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
