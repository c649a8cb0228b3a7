//! IPC module for daemon-UI communication
//!
//! The socket is the presentation boundary: clients submit intents and read
//! the transcript, mode and listening state.

mod protocol;
mod server;

pub use server::Server;
