//! Events module for session state changes
//!
//! Every observable change in the session is published as a `ChatEvent`
//! on a broadcast channel. IPC subscribers and the daemon log consume them.

use serde::{Deserialize, Serialize};

use crate::input::InputMode;
use crate::transcript::{Message, MessageId};

/// Events emitted by the session while it handles intents and signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Input mode switched
    ModeChanged { mode: InputMode, previous: InputMode },

    /// A recognition session began listening
    ListeningStarted,

    /// The active recognition session terminated
    ListeningEnded,

    /// A listening attempt failed and was discarded
    RecognitionFailed { reason: String },

    /// No speech capability on this system; voice input is disabled
    RecognitionUnavailable { notice: String },

    /// A message was appended to the transcript
    MessageAppended { message: Message },

    /// The pending text-input buffer was cleared by a submission
    DraftCleared,

    /// A responder call was dispatched for this user message
    ReplyPending { for_message: MessageId },
}

impl std::fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatEvent::ModeChanged { mode, previous } => {
                write!(f, "MODE_CHANGED ({} -> {})", previous, mode)
            }
            ChatEvent::ListeningStarted => write!(f, "LISTENING_STARTED"),
            ChatEvent::ListeningEnded => write!(f, "LISTENING_ENDED"),
            ChatEvent::RecognitionFailed { reason } => {
                write!(f, "RECOGNITION_FAILED ({})", reason)
            }
            ChatEvent::RecognitionUnavailable { .. } => write!(f, "RECOGNITION_UNAVAILABLE"),
            ChatEvent::MessageAppended { message } => {
                write!(f, "MESSAGE_APPENDED {} {}", message.id(), message)
            }
            ChatEvent::DraftCleared => write!(f, "DRAFT_CLEARED"),
            ChatEvent::ReplyPending { for_message } => {
                write!(f, "REPLY_PENDING ({})", for_message)
            }
        }
    }
}
