//! Conversation controller
//!
//! Turns finalized input into transcript entries. Replies are generated one
//! at a time in submission order: a user message submitted while another
//! reply is in flight is appended immediately, and its responder call is
//! queued until the earlier reply lands. Each assistant reply therefore
//! follows its own user message, and replies keep submission order.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::events::ChatEvent;
use crate::transcript::{Message, MessageId, MessageIds, Role, TranscriptStore};

use super::responder::{Responder, ResponderError};

/// Result of one responder call, delivered back to the session
#[derive(Debug)]
pub struct ReplyOutcome {
    pub for_message: MessageId,
    pub result: Result<String, ResponderError>,
}

#[derive(Debug)]
struct PendingReply {
    message: MessageId,
    input: String,
}

pub struct ConversationController {
    transcript: TranscriptStore,
    ids: MessageIds,
    /// Pending text-input buffer
    draft: String,
    responder: Arc<dyn Responder>,
    reply_tx: mpsc::Sender<ReplyOutcome>,
    queued: VecDeque<PendingReply>,
    in_flight: Option<MessageId>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ConversationController {
    /// Create a controller, optionally opening the transcript with a greeting
    pub fn new(
        responder: Arc<dyn Responder>,
        reply_tx: mpsc::Sender<ReplyOutcome>,
        event_tx: broadcast::Sender<ChatEvent>,
        greeting: Option<&str>,
    ) -> Self {
        let mut controller = Self {
            transcript: TranscriptStore::new(),
            ids: MessageIds::new(),
            draft: String::new(),
            responder,
            reply_tx,
            queued: VecDeque::new(),
            in_flight: None,
            event_tx,
        };

        if let Some(greeting) = greeting {
            controller.append(Role::Assistant, greeting);
        }
        controller
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Whether the draft holds something worth sending
    pub fn can_send(&self) -> bool {
        !self.draft.trim().is_empty()
    }

    /// Replies dispatched or queued but not yet appended
    pub fn pending_replies(&self) -> usize {
        self.queued.len() + usize::from(self.in_flight.is_some())
    }

    /// Submit the current draft
    pub fn submit_draft(&mut self) -> Option<Message> {
        let text = self.draft.clone();
        self.submit(&text)
    }

    /// Append `raw` as a user message and request a reply for it.
    ///
    /// Blank input is ignored and returns `None`.
    pub fn submit(&mut self, raw: &str) -> Option<Message> {
        let Some(message) = self.append(Role::User, raw) else {
            debug!("empty input ignored");
            return None;
        };

        if !self.draft.is_empty() {
            self.draft.clear();
        }
        self.emit(ChatEvent::DraftCleared);

        self.queued.push_back(PendingReply {
            message: message.id(),
            input: message.content().to_string(),
        });
        self.dispatch_next();

        Some(message)
    }

    /// Record a finished responder call and start the next queued one
    pub fn on_reply(&mut self, outcome: ReplyOutcome) {
        if self.in_flight != Some(outcome.for_message) {
            warn!(for_message = %outcome.for_message, "reply for unknown request dropped");
            return;
        }
        self.in_flight = None;

        let result = outcome.result.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(ResponderError::EmptyReply)
            } else {
                Ok(reply)
            }
        });

        match result {
            Ok(reply) => {
                self.append(Role::Assistant, &reply);
            }
            Err(e) => {
                warn!(for_message = %outcome.for_message, ?e, "reply generation failed");
                self.append(Role::Assistant, &error_notice(&e));
            }
        }

        self.dispatch_next();
    }

    fn dispatch_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(pending) = self.queued.pop_front() else {
            return;
        };

        self.in_flight = Some(pending.message);
        debug!(for_message = %pending.message, queued = self.queued.len(), "dispatching responder");
        self.emit(ChatEvent::ReplyPending {
            for_message: pending.message,
        });

        let responder = Arc::clone(&self.responder);
        let reply_tx = self.reply_tx.clone();
        tokio::spawn(async move {
            let input = pending.input;
            // a panicking responder still has to release the queue
            let result = tokio::spawn(async move { responder.generate(&input).await })
                .await
                .unwrap_or_else(|e| {
                    warn!(?e, "responder task aborted");
                    Err(ResponderError::Failed("responder crashed".into()))
                });
            let outcome = ReplyOutcome {
                for_message: pending.message,
                result,
            };
            if reply_tx.send(outcome).await.is_err() {
                debug!("session gone, reply discarded");
            }
        });
    }

    fn append(&mut self, role: Role, content: &str) -> Option<Message> {
        let message = Message::new(self.ids.next_id(), role, content)?;
        info!(id = %message.id(), role = ?message.role(), "{}", message);

        self.transcript.append(message.clone());
        self.emit(ChatEvent::MessageAppended {
            message: message.clone(),
        });
        Some(message)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Assistant-visible text for a failed reply
fn error_notice(error: &ResponderError) -> String {
    format!("Sorry, I couldn't come up with a reply ({error}). Please try again.")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::conversation::EchoResponder;

    const GREETING: &str = "Hello! I can help you with voice or text messages.";

    struct FailingResponder;

    #[async_trait]
    impl Responder for FailingResponder {
        async fn generate(&self, _input: &str) -> Result<String, ResponderError> {
            Err(ResponderError::Failed("backend offline".into()))
        }
    }

    struct BlankResponder;

    #[async_trait]
    impl Responder for BlankResponder {
        async fn generate(&self, _input: &str) -> Result<String, ResponderError> {
            Ok("   ".into())
        }
    }

    /// Panics on one particular input, echoes everything else
    struct PanickingResponder;

    #[async_trait]
    impl Responder for PanickingResponder {
        async fn generate(&self, input: &str) -> Result<String, ResponderError> {
            if input == "boom" {
                panic!("responder blew up");
            }
            Ok(EchoResponder::reply_for(input))
        }
    }

    fn controller_with(
        responder: Arc<dyn Responder>,
        greeting: Option<&str>,
    ) -> (ConversationController, mpsc::Receiver<ReplyOutcome>) {
        let (reply_tx, reply_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(64);
        (
            ConversationController::new(responder, reply_tx, event_tx, greeting),
            reply_rx,
        )
    }

    fn controller() -> (ConversationController, mpsc::Receiver<ReplyOutcome>) {
        controller_with(Arc::new(EchoResponder::new(Duration::from_secs(1))), None)
    }

    fn entries(ctl: &ConversationController) -> Vec<(Role, String)> {
        ctl.transcript()
            .all()
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_then_reply() {
        let (mut ctl, mut replies) = controller();

        let message = ctl.submit("Hello").unwrap();
        assert_eq!(message.role(), Role::User);
        assert_eq!(entries(&ctl), vec![(Role::User, "Hello".to_string())]);
        assert_eq!(ctl.pending_replies(), 1);

        ctl.on_reply(replies.recv().await.unwrap());

        let all = entries(&ctl);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].0, Role::Assistant);
        assert!(all[1].1.contains("\"Hello\""));
        assert_eq!(ctl.pending_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_ignored() {
        let (mut ctl, _replies) = controller();

        assert!(ctl.submit("").is_none());
        assert!(ctl.submit("   ").is_none());
        assert!(ctl.submit("\n\t").is_none());
        assert!(ctl.transcript().all().is_empty());
        assert_eq!(ctl.pending_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_trims_input() {
        let (mut ctl, _replies) = controller();
        let message = ctl.submit("  spaced out  ").unwrap();
        assert_eq!(message.content(), "spaced out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_are_serialized() {
        let (mut ctl, mut replies) = controller();

        ctl.submit("A");
        ctl.submit("B");
        assert_eq!(ctl.pending_replies(), 2);
        assert_eq!(
            entries(&ctl),
            vec![(Role::User, "A".to_string()), (Role::User, "B".to_string())]
        );

        let first = replies.recv().await.unwrap();
        ctl.on_reply(first);
        let second = replies.recv().await.unwrap();
        ctl.on_reply(second);

        let all = entries(&ctl);
        assert_eq!(all[0], (Role::User, "A".to_string()));
        assert_eq!(all[1], (Role::User, "B".to_string()));
        assert_eq!(all[2].1, EchoResponder::reply_for("A"));
        assert_eq!(all[3].1, EchoResponder::reply_for("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_order_and_causality() {
        let (mut ctl, mut replies) = controller();
        let inputs = ["one", "two", "three", "four"];

        for input in inputs {
            ctl.submit(input);
        }
        for _ in inputs {
            let outcome = replies.recv().await.unwrap();
            ctl.on_reply(outcome);
        }

        let all = ctl.transcript().all();
        let users: Vec<_> = all
            .iter()
            .filter(|m| m.role() == Role::User)
            .map(|m| m.content())
            .collect();
        assert_eq!(users, inputs);

        // every reply appears after the user message it answers
        for input in inputs {
            let user_pos = all.iter().position(|m| m.content() == input).unwrap();
            let reply = EchoResponder::reply_for(input);
            let reply_pos = all.iter().position(|m| m.content() == reply).unwrap();
            assert!(reply_pos > user_pos);
        }
        let replies = all.iter().filter(|m| m.role() == Role::Assistant).count();
        assert_eq!(replies, inputs.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_appends_notice() {
        let (mut ctl, mut replies) = controller_with(Arc::new(FailingResponder), None);

        ctl.submit("Hello");
        ctl.on_reply(replies.recv().await.unwrap());

        let all = ctl.transcript().all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].role(), Role::Assistant);
        assert!(all[1].content().contains("backend offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_responder_releases_queue() {
        let (mut ctl, mut replies) = controller_with(Arc::new(PanickingResponder), None);

        ctl.submit("boom");
        ctl.submit("after");
        assert_eq!(ctl.pending_replies(), 2);

        ctl.on_reply(replies.recv().await.unwrap());
        ctl.on_reply(replies.recv().await.unwrap());

        let all = ctl.transcript().all();
        assert_eq!(all.len(), 4);
        assert_eq!(all[2].role(), Role::Assistant);
        assert!(all[2].content().contains("responder crashed"));
        assert_eq!(all[3].content(), EchoResponder::reply_for("after"));
        assert_eq!(ctl.pending_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_reply_appends_notice() {
        let (mut ctl, mut replies) = controller_with(Arc::new(BlankResponder), None);

        ctl.submit("Hello");
        ctl.on_reply(replies.recv().await.unwrap());

        let all = ctl.transcript().all();
        assert_eq!(all.len(), 2);
        assert!(all[1].content().contains("empty reply"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_reply_dropped() {
        let (mut ctl, _replies) = controller();
        let mut ids = MessageIds::new();

        ctl.on_reply(ReplyOutcome {
            for_message: ids.next_id(),
            result: Ok("stray".into()),
        });
        assert!(ctl.transcript().all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_opens_transcript() {
        let (ctl, _replies) = controller_with(
            Arc::new(EchoResponder::default()),
            Some(GREETING),
        );
        assert_eq!(entries(&ctl), vec![(Role::Assistant, GREETING.to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_cleared_on_submit() {
        let (mut ctl, _replies) = controller();

        ctl.set_draft("   ");
        assert!(!ctl.can_send());
        assert!(ctl.submit_draft().is_none());

        ctl.set_draft("typed text");
        assert!(ctl.can_send());
        let message = ctl.submit_draft().unwrap();
        assert_eq!(message.content(), "typed text");
        assert_eq!(ctl.draft(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_submit_clears_draft() {
        let (mut ctl, _replies) = controller();
        ctl.set_draft("half typed");

        ctl.submit("book a flight");
        assert_eq!(ctl.draft(), "");
    }
}
