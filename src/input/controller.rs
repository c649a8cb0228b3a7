//! Input mode controller
//!
//! Owns the current input mode and the recognizer adapter. Exactly one
//! input channel is usable at a time: text submission is rejected in voice
//! mode or while a recognition session is open, and switching modes tears
//! down any open session before the new mode takes effect.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::ChatEvent;
use crate::recognizer::{
    RecognizerAdapter, RecognizerError, RecognizerEvent, RecognizerSignal, SessionPhase,
    UNAVAILABLE_NOTICE,
};

use super::{InputMode, IntentError};

pub struct InputModeController {
    mode: InputMode,
    adapter: RecognizerAdapter,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl InputModeController {
    /// Create a controller in text mode
    pub fn new(adapter: RecognizerAdapter, event_tx: broadcast::Sender<ChatEvent>) -> Self {
        let controller = Self {
            mode: InputMode::Text,
            adapter,
            event_tx,
        };

        if let Some(notice) = controller.notice() {
            warn!("speech recognition unavailable, voice input disabled");
            controller.emit(ChatEvent::RecognitionUnavailable {
                notice: notice.to_string(),
            });
        }

        controller
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn is_listening(&self) -> bool {
        self.adapter.is_listening()
    }

    /// Phase of the open recognition session, `None` when idle
    pub fn recognition_phase(&self) -> Option<SessionPhase> {
        self.adapter.phase()
    }

    pub fn voice_available(&self) -> bool {
        self.adapter.is_available()
    }

    /// Standing notice while no speech capability exists
    pub fn notice(&self) -> Option<&'static str> {
        (!self.adapter.is_available()).then_some(UNAVAILABLE_NOTICE)
    }

    #[cfg(test)]
    pub fn sessions_started(&self) -> u64 {
        self.adapter.sessions_started()
    }

    /// Switch modes, stopping any open recognition session first.
    ///
    /// Returns the previous mode.
    pub fn set_mode(&mut self, mode: InputMode) -> InputMode {
        if let Some(event) = self.adapter.stop() {
            self.apply(event);
        }

        let previous = self.mode;
        if previous != mode {
            self.mode = mode;
            info!(from = %previous, to = %mode, "input mode changed");
            self.emit(ChatEvent::ModeChanged { mode, previous });
        }
        previous
    }

    /// Flip between text and voice; returns the new mode
    pub fn toggle_mode(&mut self) -> InputMode {
        let next = self.mode.other();
        self.set_mode(next);
        next
    }

    /// Open a recognition session.
    ///
    /// Returns `Ok(true)` if a session was opened. Starting while already
    /// listening, or without a speech capability, is a no-op.
    pub fn begin_listening(&mut self) -> Result<bool, IntentError> {
        self.require_mode("tap-to-talk", InputMode::Voice)?;

        match self.adapter.start() {
            Ok(Some(event)) => {
                self.apply(event);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(RecognizerError::Unavailable) => {
                debug!("listen request ignored, no speech capability");
                Ok(false)
            }
            Err(e) => {
                warn!(?e, "recognizer failed to start");
                self.apply(RecognizerEvent::Error(e.reason()));
                Ok(false)
            }
        }
    }

    /// Stop listening; returns whether a session was open
    pub fn end_listening(&mut self) -> bool {
        match self.adapter.stop() {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Tap-to-talk: start when idle, stop when listening.
    ///
    /// Returns whether a session is open afterwards.
    pub fn toggle_talk(&mut self) -> Result<bool, IntentError> {
        self.require_mode("tap-to-talk", InputMode::Voice)?;

        if self.is_listening() {
            self.end_listening();
        } else {
            self.begin_listening()?;
        }
        Ok(self.is_listening())
    }

    /// Check that typed input may be submitted right now
    pub fn check_text_allowed(&self) -> Result<(), IntentError> {
        self.require_mode("text input", InputMode::Text)?;
        if self.is_listening() {
            return Err(IntentError::Listening);
        }
        Ok(())
    }

    /// Feed a backend signal through the adapter.
    ///
    /// Returns finalized speech that should be submitted as user input.
    pub fn handle_signal(&mut self, signal: RecognizerSignal) -> Option<String> {
        let event = self.adapter.accept(signal)?;
        self.apply(event)
    }

    fn apply(&self, event: RecognizerEvent) -> Option<String> {
        match event {
            RecognizerEvent::Started => {
                self.emit(ChatEvent::ListeningStarted);
                None
            }
            RecognizerEvent::Result(text) => {
                info!(chars = text.len(), "speech finalized");
                Some(text)
            }
            RecognizerEvent::Error(reason) => {
                warn!(%reason, "speech recognition error, attempt discarded");
                self.emit(ChatEvent::RecognitionFailed { reason });
                None
            }
            RecognizerEvent::Ended => {
                self.emit(ChatEvent::ListeningEnded);
                None
            }
        }
    }

    fn require_mode(&self, intent: &'static str, expected: InputMode) -> Result<(), IntentError> {
        if self.mode != expected {
            return Err(IntentError::WrongMode {
                intent,
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }

    fn emit(&self, event: ChatEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}
