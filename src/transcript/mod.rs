//! Transcript module
//!
//! Messages and the append-only store that holds them for one session.

mod message;
mod store;

pub use message::{Message, MessageId, MessageIds, Role};
pub use store::TranscriptStore;
