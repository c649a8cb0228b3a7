//! Conversation module
//!
//! Accepts finalized input from either channel, records it in the
//! transcript and appends the responder's reply when it arrives.

mod controller;
mod responder;

pub use controller::{ConversationController, ReplyOutcome};
pub use responder::{EchoResponder, Responder};
