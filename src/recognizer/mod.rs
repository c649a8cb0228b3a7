//! Speech recognition capability
//!
//! The platform recognizer is an opaque backend behind the `Recognizer`
//! trait. Whether one exists is decided once at startup by `probe`; the
//! rest of the daemon only talks to `RecognizerAdapter`, which owns the
//! per-attempt lifecycle:
//!
//! - `start` on an idle adapter opens a session and yields `Started`
//! - the backend reports at most one `Result` or `Error` for the session
//! - `Ended` always closes the session, after which the adapter is idle

mod adapter;
mod command;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use adapter::{RecognizerAdapter, SessionPhase};
#[cfg(test)]
pub(crate) use adapter::fake;
pub use command::CommandRecognizer;

/// Identifies one listen attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

/// Lifecycle events of a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Started,
    /// Speech finalized into text
    Result(String),
    /// Recognition failed, e.g. `no-speech`
    Error(String),
    Ended,
}

impl RecognizerEvent {
    /// `Result` and `Error` are terminal; a session reports at most one
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecognizerEvent::Result(_) | RecognizerEvent::Error(_))
    }
}

/// An event reported by a backend, tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerSignal {
    pub session: SessionId,
    pub event: RecognizerEvent,
}

/// Fixed recognition settings
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// External recognizer command line, program first
    pub command: Option<Vec<String>>,
    /// Single fixed locale passed to the backend
    pub locale: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            command: None,
            locale: "en-US".to_string(),
        }
    }
}

/// Errors raised by recognizer backends
#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("speech recognition is not available")]
    Unavailable,

    #[error("failed to launch recognizer: {0}")]
    Spawn(String),

    #[error("recognition failed: {0}")]
    Failed(String),
}

impl RecognizerError {
    /// Short reason carried by `RecognizerEvent::Error`
    pub fn reason(&self) -> String {
        match self {
            RecognizerError::Unavailable => "unavailable".to_string(),
            RecognizerError::Spawn(reason) | RecognizerError::Failed(reason) => reason.clone(),
        }
    }
}

/// A platform speech recognition backend.
///
/// `start` is fire-and-forget: the backend reports progress through
/// `signals`, finishing every session with `RecognizerEvent::Ended`.
/// Backends run non-continuously without interim results, so a session
/// produces at most one `Result` or `Error`.
pub trait Recognizer: Send {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Begin listening for `session`
    fn start(
        &mut self,
        session: SessionId,
        signals: mpsc::Sender<RecognizerSignal>,
    ) -> Result<(), RecognizerError>;

    /// Abort the current session, if any
    fn stop(&mut self);
}

/// Notice shown for the whole session when no capability exists
pub const UNAVAILABLE_NOTICE: &str =
    "Voice recognition is not available on this system. Please use text input.";

/// Detect the speech capability once at startup
pub fn probe(config: &RecognizerConfig) -> Option<Box<dyn Recognizer>> {
    let Some(command) = config.command.as_deref() else {
        info!("no recognizer configured");
        return None;
    };

    match CommandRecognizer::probe(command, &config.locale) {
        Some(recognizer) => {
            info!(
                backend = recognizer.name(),
                program = ?recognizer.program(),
                locale = %config.locale,
                "speech recognizer available"
            );
            Some(Box::new(recognizer))
        }
        None => {
            warn!(?command, "configured recognizer not found");
            None
        }
    }
}
