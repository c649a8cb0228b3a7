//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::ChatEvent;
use crate::input::{InputMode, IntentError};
use crate::session::{DraftState, ModeChange, SessionStatus};
use crate::transcript::Message;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from the presentation layer to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Request the full ordered transcript
    GetTranscript,

    /// Switch input mode
    SetMode { mode: InputMode },

    /// Flip between text and voice
    ToggleMode,

    /// Replace the text-input buffer
    SetDraft { text: String },

    /// Submit typed text (text mode only)
    SubmitText { text: String },

    /// Submit the held text-input buffer (text mode only)
    SubmitDraft,

    /// Start or stop listening (voice mode only)
    ToggleTalk,

    /// Turn this connection into a notification stream
    Subscribe,
}

/// Responses from daemon to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Ordered transcript
    Transcript { messages: Vec<Message> },

    /// Mode after a switch
    ModeChange { mode: InputMode, previous: InputMode },

    /// Buffer after an update
    Draft(DraftState),

    /// Submission handled; `message` is null for blank input
    Accepted { message: Option<Message> },

    /// Listening state after tap-to-talk
    Listening { active: bool },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl From<IntentError> for Response {
    fn from(error: IntentError) -> Self {
        Response::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<ModeChange> for Response {
    fn from(change: ModeChange) -> Self {
        Response::ModeChange {
            mode: change.mode,
            previous: change.previous,
        }
    }
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event: ChatEvent,
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    #[serde(flatten)]
    pub session: SessionStatus,
}

impl DaemonStatus {
    pub fn new(session: SessionStatus, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            session,
        }
    }
}
