//! Session module
//!
//! Runs the conversation as a single task:
//! - InputModeController: text vs voice, recognition lifecycle
//! - ConversationController: transcript and replies
//! - SessionHandle: the intents the presentation layer may send

mod runner;

pub use runner::{DraftState, ModeChange, Session, SessionHandle, SessionStatus};
