//! Input module
//!
//! Tracks which input channel is active:
//! - Text: typed submissions are accepted
//! - Voice: tap-to-talk opens recognition sessions

mod controller;

use serde::{Deserialize, Serialize};

pub use controller::InputModeController;

/// The active input channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Text,
    Voice,
}

impl InputMode {
    /// The mode a toggle switches to
    pub fn other(self) -> Self {
        match self {
            InputMode::Text => InputMode::Voice,
            InputMode::Voice => InputMode::Text,
        }
    }
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputMode::Text => write!(f, "text"),
            InputMode::Voice => write!(f, "voice"),
        }
    }
}

/// A user intent that cannot be honored in the current state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("{intent} is only available in {expected} mode (current: {actual})")]
    WrongMode {
        intent: &'static str,
        expected: InputMode,
        actual: InputMode,
    },

    #[error("text input is disabled while listening")]
    Listening,

    #[error("session is not running")]
    SessionClosed,
}

impl IntentError {
    /// Stable code reported over IPC
    pub fn code(&self) -> &'static str {
        match self {
            IntentError::WrongMode { .. } => "wrong_mode",
            IntentError::Listening => "listening",
            IntentError::SessionClosed => "session_closed",
        }
    }
}
