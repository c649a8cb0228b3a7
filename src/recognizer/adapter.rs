//! Recognition session lifecycle on top of an optional backend
//!
//! The adapter tags every attempt with a fresh `SessionId`. Signals that
//! arrive for any other id are stale (the attempt was stopped or already
//! ended) and are dropped, which keeps a late backend from reviving a
//! session after a mode switch.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Recognizer, RecognizerError, RecognizerEvent, RecognizerSignal, SessionId};

/// Phase of the non-idle session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for speech
    Listening,
    /// A result was reported, waiting for `Ended`
    Finalized,
    /// An error was reported, waiting for `Ended`
    Errored,
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    phase: SessionPhase,
}

/// Wraps the platform recognizer behind a start/stop/events interface
pub struct RecognizerAdapter {
    backend: Option<Box<dyn Recognizer>>,
    signals: mpsc::Sender<RecognizerSignal>,
    active: Option<ActiveSession>,
    next_session: u64,
}

impl RecognizerAdapter {
    /// Create an adapter; `None` means the capability is unavailable
    pub fn new(
        backend: Option<Box<dyn Recognizer>>,
        signals: mpsc::Sender<RecognizerSignal>,
    ) -> Self {
        Self {
            backend,
            signals,
            active: None,
            next_session: 1,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// True while a session is in any non-idle phase
    pub fn is_listening(&self) -> bool {
        self.active.is_some()
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.active.as_ref().map(|s| s.phase)
    }

    /// Number of sessions opened so far
    #[cfg(test)]
    pub fn sessions_started(&self) -> u64 {
        self.next_session - 1
    }

    /// Begin listening.
    ///
    /// Returns `Ok(None)` when a session is already active.
    pub fn start(&mut self) -> Result<Option<RecognizerEvent>, RecognizerError> {
        if self.active.is_some() {
            debug!("start ignored, already listening");
            return Ok(None);
        }

        let backend = self.backend.as_mut().ok_or(RecognizerError::Unavailable)?;

        let id = SessionId(self.next_session);
        backend.start(id, self.signals.clone())?;
        self.next_session += 1;

        info!(session = %id, backend = backend.name(), "recognition session started");
        self.active = Some(ActiveSession {
            id,
            phase: SessionPhase::Listening,
        });

        Ok(Some(RecognizerEvent::Started))
    }

    /// Terminate the active session immediately.
    ///
    /// The session is idle when this returns; the synthesized `Ended` is
    /// handed back to the caller and anything the backend still reports for
    /// the old session is discarded as stale.
    pub fn stop(&mut self) -> Option<RecognizerEvent> {
        let session = self.active.take()?;

        if let Some(backend) = self.backend.as_mut() {
            backend.stop();
        }

        info!(session = %session.id, phase = ?session.phase, "recognition session stopped");
        Some(RecognizerEvent::Ended)
    }

    /// Filter a backend signal through the session lifecycle
    pub fn accept(&mut self, signal: RecognizerSignal) -> Option<RecognizerEvent> {
        let Some(session) = self.active.as_mut().filter(|s| s.id == signal.session) else {
            debug!(session = %signal.session, event = ?signal.event, "dropping stale recognizer signal");
            return None;
        };

        if signal.event.is_terminal() && session.phase != SessionPhase::Listening {
            warn!(session = %session.id, "dropping extra terminal recognizer event");
            return None;
        }

        match signal.event {
            RecognizerEvent::Started => None,
            RecognizerEvent::Result(text) => {
                session.phase = SessionPhase::Finalized;
                Some(RecognizerEvent::Result(text))
            }
            RecognizerEvent::Error(reason) => {
                session.phase = SessionPhase::Errored;
                Some(RecognizerEvent::Error(reason))
            }
            RecognizerEvent::Ended => {
                debug!(session = %session.id, phase = ?session.phase, "recognition session ended");
                self.active = None;
                Some(RecognizerEvent::Ended)
            }
        }
    }
}
