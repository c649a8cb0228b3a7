//! Unix domain socket server for IPC
//!
//! Provides request-response access to the session and, after `subscribe`,
//! a push stream of chat events.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::ChatEvent;
use crate::session::SessionHandle;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    client: ClientContext,
    shutdown_tx: broadcast::Sender<()>,
}

/// What each client handler needs
#[derive(Clone)]
struct ClientContext {
    session: SessionHandle,
    event_tx: broadcast::Sender<ChatEvent>,
    start_time: Instant,
}

impl Server {
    /// Bind the socket and create a server for `session`
    pub fn new(
        socket_path: &Path,
        session: SessionHandle,
        event_tx: broadcast::Sender<ChatEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            client: ClientContext {
                session,
                event_tx,
                start_time: Instant::now(),
            },
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let client = self.client.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, client) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client<S>(mut stream: S, client: ClientContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(body) = read_message(&mut stream).await? else {
            debug!("client disconnected");
            return Ok(());
        };

        let request: Request =
            serde_json::from_slice(&body).context("failed to parse request")?;
        debug!(?request, "received request");

        if let Request::Subscribe = request {
            // subscribe before confirming so no event falls in between
            let events = client.event_tx.subscribe();
            send_message(&mut stream, &Response::Subscribed).await?;
            debug!("client subscribed to notifications");
            return stream_events(&mut stream, events).await;
        }

        let response = process_request(request, &client).await;
        send_message(&mut stream, &response).await?;
    }
}

/// Forward chat events until the channel closes or the client goes away
async fn stream_events<S>(stream: &mut S, mut events: broadcast::Receiver<ChatEvent>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    loop {
        match events.recv().await {
            Ok(event) => send_message(stream, &Notification { event }).await?,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Read one length-prefixed frame; `None` on clean end of stream
async fn read_message<S>(stream: &mut S) -> Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large ({len} bytes)");
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn send_message<S, T>(stream: &mut S, msg: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Map a request onto the session
async fn process_request(request: Request, client: &ClientContext) -> Response {
    let session = &client.session;

    let result = match request {
        Request::Ping => Ok(Response::Pong),

        Request::GetStatus => session.status().await.map(|status| {
            let uptime = client.start_time.elapsed().as_secs();
            Response::Status(DaemonStatus::new(status, uptime))
        }),

        Request::GetTranscript => session
            .transcript()
            .await
            .map(|messages| Response::Transcript { messages }),

        Request::SetMode { mode } => session.set_mode(mode).await.map(Response::from),

        Request::ToggleMode => session.toggle_mode().await.map(Response::from),

        Request::SetDraft { text } => session.set_draft(text).await.map(Response::Draft),

        Request::SubmitText { text } => session
            .submit_text(text)
            .await
            .map(|message| Response::Accepted { message }),

        Request::SubmitDraft => session
            .submit_draft()
            .await
            .map(|message| Response::Accepted { message }),

        Request::ToggleTalk => session
            .toggle_talk()
            .await
            .map(|active| Response::Listening { active }),

        // handled by the connection loop
        Request::Subscribe => Ok(Response::Subscribed),
    };

    result.unwrap_or_else(|e| {
        debug!(?e, "request rejected");
        Response::from(e)
    })
}
