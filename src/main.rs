//! voxchat: background daemon for a single voice-or-text conversation
//!
//! The daemon provides:
//! - A conversation session with an append-only transcript
//! - Text or voice input, one channel active at a time
//! - Speech recognition through an optional external recognizer
//! - A pluggable responder (a fixed-delay echo by default)
//! - IPC server for the presentation layer
//!
//! Out of scope: rendering, persistence of the transcript, real language
//! understanding.

mod config;
mod conversation;
mod events;
mod input;
mod ipc;
mod lifecycle;
mod recognizer;
mod session;
mod transcript;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::conversation::EchoResponder;
use crate::events::ChatEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voxchat starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket = ?config.socket_path,
        reply_delay_ms = config.reply_delay.as_millis() as u64,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    // Session -> IPC subscribers and the log
    let (event_tx, _) = broadcast::channel::<ChatEvent>(256);
    let mut log_rx = event_tx.subscribe();

    // Capability probe happens exactly once, here
    let recognizer = recognizer::probe(&config.recognizer);
    let responder = Arc::new(EchoResponder::new(config.reply_delay));

    let session = Session::new(
        recognizer,
        responder,
        event_tx.clone(),
        config.greeting.as_deref(),
    );
    let (handle, mut session_task) = session.start();

    let server = Server::new(&config.socket_path, handle, event_tx.clone())?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        result = &mut session_task => {
            if let Err(e) = result {
                error!(?e, "session task failed");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => debug!(%event, "chat event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event log receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event log exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;
    session_task.abort();

    info!("voxchat stopped");

    Ok(())
}
