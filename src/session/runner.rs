//! Session actor
//!
//! One task owns every piece of conversational state and handles one input
//! at a time: presentation commands, recognizer signals and responder
//! outcomes. Nothing else mutates the transcript or the recognition
//! session, so handlers never race each other.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::conversation::{ConversationController, ReplyOutcome, Responder};
use crate::events::ChatEvent;
use crate::input::{InputMode, InputModeController, IntentError};
use crate::recognizer::{Recognizer, RecognizerAdapter, RecognizerSignal, SessionPhase};
use crate::transcript::Message;

/// Snapshot of what the presentation layer renders besides the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub mode: InputMode,
    pub listening: bool,
    /// Phase of the open recognition session
    pub recognition: Option<SessionPhase>,
    pub voice_available: bool,
    /// Standing notice, set when voice input is unavailable
    pub notice: Option<String>,
    pub can_send: bool,
    pub pending_replies: usize,
    pub message_count: usize,
}

/// Outcome of a mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChange {
    pub mode: InputMode,
    pub previous: InputMode,
}

/// Current text-input buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftState {
    pub text: String,
    pub can_send: bool,
}

/// Requests handled by the session task
#[derive(Debug)]
pub enum SessionCommand {
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<Message>>,
    },
    SetMode {
        mode: InputMode,
        reply: oneshot::Sender<ModeChange>,
    },
    ToggleMode {
        reply: oneshot::Sender<ModeChange>,
    },
    SetDraft {
        text: String,
        reply: oneshot::Sender<DraftState>,
    },
    /// Submit typed text; `None` submits the held draft
    SubmitText {
        text: Option<String>,
        reply: oneshot::Sender<Result<Option<Message>, IntentError>>,
    },
    ToggleTalk {
        reply: oneshot::Sender<Result<bool, IntentError>>,
    },
}

/// The conversation session and its inputs
pub struct Session {
    input: InputModeController,
    conversation: ConversationController,
    signal_rx: mpsc::Receiver<RecognizerSignal>,
    reply_rx: mpsc::Receiver<ReplyOutcome>,
}

impl Session {
    /// Create a session; `recognizer` is the result of the startup probe
    pub fn new(
        recognizer: Option<Box<dyn Recognizer>>,
        responder: Arc<dyn Responder>,
        event_tx: broadcast::Sender<ChatEvent>,
        greeting: Option<&str>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let (reply_tx, reply_rx) = mpsc::channel(32);

        let adapter = RecognizerAdapter::new(recognizer, signal_tx);
        let input = InputModeController::new(adapter, event_tx.clone());
        let conversation = ConversationController::new(responder, reply_tx, event_tx, greeting);

        Self {
            input,
            conversation,
            signal_rx,
            reply_rx,
        }
    }

    /// Spawn the session task and return a handle to it
    pub fn start(self) -> (SessionHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let task = tokio::spawn(self.run(command_rx));
        (SessionHandle { command_tx }, task)
    }

    /// Process inputs until every `SessionHandle` is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(mode = %self.input.mode(), voice = self.input.voice_available(), "session started");

        loop {
            tokio::select! {
                biased;

                Some(signal) = self.signal_rx.recv() => {
                    self.handle_signal(signal);
                }
                Some(outcome) = self.reply_rx.recv() => {
                    self.conversation.on_reply(outcome);
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        self.input.end_listening();
        info!("session stopped");
    }

    fn handle_signal(&mut self, signal: RecognizerSignal) {
        if let Some(text) = self.input.handle_signal(signal) {
            self.conversation.submit(&text);
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(?command, "session command");

        match command {
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::Transcript { reply } => {
                let _ = reply.send(self.conversation.transcript().all().to_vec());
            }
            SessionCommand::SetMode { mode, reply } => {
                let previous = self.input.set_mode(mode);
                let _ = reply.send(ModeChange { mode, previous });
            }
            SessionCommand::ToggleMode { reply } => {
                let previous = self.input.mode();
                let mode = self.input.toggle_mode();
                let _ = reply.send(ModeChange { mode, previous });
            }
            SessionCommand::SetDraft { text, reply } => {
                self.conversation.set_draft(text);
                let _ = reply.send(self.draft_state());
            }
            SessionCommand::SubmitText { text, reply } => {
                let _ = reply.send(self.submit_text(text));
            }
            SessionCommand::ToggleTalk { reply } => {
                let _ = reply.send(self.input.toggle_talk());
            }
        }
    }

    fn submit_text(&mut self, text: Option<String>) -> Result<Option<Message>, IntentError> {
        self.input.check_text_allowed()?;
        Ok(match text {
            Some(text) => self.conversation.submit(&text),
            None => self.conversation.submit_draft(),
        })
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            mode: self.input.mode(),
            listening: self.input.is_listening(),
            recognition: self.input.recognition_phase(),
            voice_available: self.input.voice_available(),
            notice: self.input.notice().map(str::to_string),
            can_send: self.conversation.can_send() && self.input.check_text_allowed().is_ok(),
            pending_replies: self.conversation.pending_replies(),
            message_count: self.conversation.transcript().len(),
        }
    }

    fn draft_state(&self) -> DraftState {
        DraftState {
            text: self.conversation.draft().to_string(),
            can_send: self.conversation.can_send(),
        }
    }
}

/// Cloneable command side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, IntentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| IntentError::SessionClosed)?;
        reply_rx.await.map_err(|_| IntentError::SessionClosed)
    }

    pub async fn status(&self) -> Result<SessionStatus, IntentError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    pub async fn transcript(&self) -> Result<Vec<Message>, IntentError> {
        self.request(|reply| SessionCommand::Transcript { reply }).await
    }

    pub async fn set_mode(&self, mode: InputMode) -> Result<ModeChange, IntentError> {
        self.request(|reply| SessionCommand::SetMode { mode, reply }).await
    }

    pub async fn toggle_mode(&self) -> Result<ModeChange, IntentError> {
        self.request(|reply| SessionCommand::ToggleMode { reply }).await
    }

    pub async fn set_draft(&self, text: String) -> Result<DraftState, IntentError> {
        self.request(|reply| SessionCommand::SetDraft { text, reply }).await
    }

    /// Submit typed text; `Ok(None)` means the input was blank
    pub async fn submit_text(&self, text: String) -> Result<Option<Message>, IntentError> {
        self.request(|reply| SessionCommand::SubmitText {
            text: Some(text),
            reply,
        })
        .await?
    }

    pub async fn submit_draft(&self) -> Result<Option<Message>, IntentError> {
        self.request(|reply| SessionCommand::SubmitText { text: None, reply })
            .await?
    }

    /// Tap-to-talk; returns whether the session is listening afterwards
    pub async fn toggle_talk(&self) -> Result<bool, IntentError> {
        self.request(|reply| SessionCommand::ToggleTalk { reply })
            .await?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::conversation::EchoResponder;
    use crate::recognizer::fake::FakeRecognizer;
    use crate::recognizer::{RecognizerEvent, UNAVAILABLE_NOTICE};
    use crate::transcript::Role;

    struct Harness {
        handle: SessionHandle,
        fake: FakeRecognizer,
        events: broadcast::Receiver<ChatEvent>,
    }

    fn start(with_voice: bool) -> Harness {
        let (event_tx, events) = broadcast::channel(64);
        let fake = FakeRecognizer::default();
        let recognizer: Option<Box<dyn Recognizer>> = if with_voice {
            Some(Box::new(fake.clone()))
        } else {
            None
        };
        let responder = Arc::new(EchoResponder::new(Duration::from_secs(1)));
        let (handle, _task) = Session::new(recognizer, responder, event_tx, None).start();
        Harness {
            handle,
            fake,
            events,
        }
    }

    fn contents(messages: &[Message]) -> Vec<(Role, &str)> {
        messages.iter().map(|m| (m.role(), m.content())).collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hello_gets_reply() {
        let h = start(true);

        let message = h.handle.submit_text("Hello".into()).await.unwrap().unwrap();
        assert_eq!(message.content(), "Hello");
        let transcript = h.handle.transcript().await.unwrap();
        assert_eq!(contents(&transcript), vec![(Role::User, "Hello")]);

        settle().await;
        let transcript = h.handle.transcript().await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role(), Role::Assistant);
        assert!(transcript[1].content().contains("Hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_result_becomes_message() {
        let h = start(true);
        h.handle.set_mode(InputMode::Voice).await.unwrap();
        assert!(h.handle.toggle_talk().await.unwrap());

        h.fake.emit(RecognizerEvent::Result("book a flight".into())).await;
        h.fake.emit(RecognizerEvent::Ended).await;

        let transcript = h.handle.transcript().await.unwrap();
        assert_eq!(contents(&transcript), vec![(Role::User, "book a flight")]);
        assert!(!h.handle.status().await.unwrap().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_error_leaves_transcript() {
        let mut h = start(true);
        h.handle.set_mode(InputMode::Voice).await.unwrap();
        h.handle.toggle_talk().await.unwrap();

        h.fake.emit(RecognizerEvent::Error("no-speech".into())).await;
        h.fake.emit(RecognizerEvent::Ended).await;

        let status = h.handle.status().await.unwrap();
        assert!(!status.listening);
        assert_eq!(status.mode, InputMode::Voice);
        assert!(h.handle.transcript().await.unwrap().is_empty());

        let mut saw_failure = false;
        while let Ok(event) = h.events.try_recv() {
            saw_failure |= matches!(event, ChatEvent::RecognitionFailed { .. });
        }
        assert!(saw_failure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_submit_order() {
        let h = start(true);

        h.handle.submit_text("A".into()).await.unwrap();
        h.handle.submit_text("B".into()).await.unwrap();
        settle().await;

        let transcript = h.handle.transcript().await.unwrap();
        assert_eq!(
            contents(&transcript),
            vec![
                (Role::User, "A"),
                (Role::User, "B"),
                (Role::Assistant, EchoResponder::reply_for("A").as_str()),
                (Role::Assistant, EchoResponder::reply_for("B").as_str()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_submit_creates_nothing() {
        let h = start(true);

        assert_eq!(h.handle.submit_text(String::new()).await, Ok(None));
        assert_eq!(h.handle.submit_text("   ".into()).await, Ok(None));
        settle().await;
        assert!(h.handle.transcript().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_while_listening() {
        let h = start(true);
        h.handle.set_mode(InputMode::Voice).await.unwrap();
        h.handle.toggle_talk().await.unwrap();
        let session = h.fake.current();

        let change = h.handle.set_mode(InputMode::Text).await.unwrap();
        assert_eq!(change.previous, InputMode::Voice);
        assert!(!h.handle.status().await.unwrap().listening);
        assert_eq!(h.fake.state.lock().unwrap().stops, 1);

        // a result racing the stop must not reach the transcript
        h.fake.emit(RecognizerEvent::Result("too late".into())).await;
        assert_eq!(h.fake.current(), session);
        assert!(h.handle.transcript().await.unwrap().is_empty());

        assert_ok!(h.handle.submit_text("typed".into()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_rejected_in_voice_mode() {
        let h = start(true);
        h.handle.set_mode(InputMode::Voice).await.unwrap();

        let err = h.handle.submit_text("hi".into()).await.unwrap_err();
        assert_eq!(err.code(), "wrong_mode");
        let err = h.handle.submit_draft().await.unwrap_err();
        assert_eq!(err.code(), "wrong_mode");
    }

    #[tokio::test(start_paused = true)]
    async fn test_talk_rejected_in_text_mode() {
        let h = start(true);
        let err = h.handle.toggle_talk().await.unwrap_err();
        assert_eq!(err.code(), "wrong_mode");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_capability() {
        let h = start(false);

        let status = h.handle.status().await.unwrap();
        assert!(!status.voice_available);
        assert_eq!(status.notice.as_deref(), Some(UNAVAILABLE_NOTICE));

        h.handle.set_mode(InputMode::Voice).await.unwrap();
        assert!(!h.handle.toggle_talk().await.unwrap());
        assert!(!h.handle.status().await.unwrap().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_flow() {
        let h = start(true);

        let draft = h.handle.set_draft("draft text".into()).await.unwrap();
        assert!(draft.can_send);
        assert!(h.handle.status().await.unwrap().can_send);

        let message = h.handle.submit_draft().await.unwrap().unwrap();
        assert_eq!(message.content(), "draft text");
        let status = h.handle.status().await.unwrap();
        assert!(!status.can_send);
        assert_eq!(status.pending_replies, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_mode() {
        let h = start(true);
        let change = h.handle.toggle_mode().await.unwrap();
        assert_eq!(change, ModeChange { mode: InputMode::Voice, previous: InputMode::Text });
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session() {
        let (event_tx, _) = broadcast::channel(8);
        let responder = Arc::new(EchoResponder::default());
        let (handle, task) = Session::new(None, responder, event_tx, None).start();
        task.abort();
        let _ = task.await;

        assert_eq!(handle.status().await.unwrap_err(), IntentError::SessionClosed);
    }
}
