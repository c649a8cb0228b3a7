//! External speech-to-text program as a recognizer backend
//!
//! Each listen attempt runs the configured program once. Its trimmed
//! stdout is the finalized utterance; a non-zero exit is a recognition
//! error. The program is expected to capture a single utterance and exit.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Recognizer, RecognizerError, RecognizerEvent, RecognizerSignal, SessionId};

/// Environment variable carrying the fixed locale to the program
pub const LOCALE_ENV: &str = "VOXCHAT_LOCALE";

/// Recognizer that shells out to a speech-to-text command
#[derive(Debug)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    locale: String,
    cancel: Option<oneshot::Sender<()>>,
}

impl CommandRecognizer {
    /// Resolve `command` (program first) and build a recognizer for it.
    ///
    /// Returns `None` when the program cannot be found.
    pub fn probe(command: &[String], locale: &str) -> Option<Self> {
        let (program, args) = command.split_first()?;
        let program = resolve_program(program)?;

        Some(Self {
            program,
            args: args.to_vec(),
            locale: locale.to_string(),
            cancel: None,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Recognizer for CommandRecognizer {
    fn name(&self) -> &str {
        "command"
    }

    fn start(
        &mut self,
        session: SessionId,
        signals: mpsc::Sender<RecognizerSignal>,
    ) -> Result<(), RecognizerError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(LOCALE_ENV, &self.locale)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognizerError::Spawn(e.to_string()))?;

        debug!(%session, program = ?self.program, "recognizer process spawned");

        let (cancel_tx, cancel_rx) = oneshot::channel();
        // Replacing an old sender drops it, which cancels that attempt too.
        self.cancel = Some(cancel_tx);

        tokio::spawn(run_attempt(child, session, signals, cancel_rx));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Drive one recognizer process to completion or cancellation
async fn run_attempt(
    mut child: Child,
    session: SessionId,
    signals: mpsc::Sender<RecognizerSignal>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = tokio::select! {
        _ = cancel_rx => None,
        output = read_output(stdout, stderr) => Some(output),
    };

    let event = match outcome {
        None => {
            if let Err(e) = child.kill().await {
                warn!(%session, ?e, "failed to kill recognizer process");
            }
            debug!(%session, "recognizer process cancelled");
            None
        }
        Some(output) => Some(match finish(&mut child, output).await {
            Ok(text) => RecognizerEvent::Result(text),
            Err(e) => RecognizerEvent::Error(e.reason()),
        }),
    };

    if let Some(event) = event {
        let _ = signals.send(RecognizerSignal { session, event }).await;
    }
    let _ = signals
        .send(RecognizerSignal {
            session,
            event: RecognizerEvent::Ended,
        })
        .await;
}

async fn read_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> Result<(String, String), RecognizerError> {
    let mut stdout = stdout.ok_or_else(|| RecognizerError::Failed("stdout unavailable".into()))?;
    let mut out = String::new();
    let mut err = String::new();

    let (out_res, err_res) = tokio::join!(stdout.read_to_string(&mut out), async {
        match stderr {
            Some(mut stderr) => stderr.read_to_string(&mut err).await.map(|_| ()),
            None => Ok(()),
        }
    });
    out_res.map_err(|e| RecognizerError::Failed(e.to_string()))?;
    if let Err(e) = err_res {
        debug!(?e, "failed to read recognizer stderr");
    }

    Ok((out, err))
}

/// Turn the collected output and exit status into a transcript
async fn finish(
    child: &mut Child,
    output: Result<(String, String), RecognizerError>,
) -> Result<String, RecognizerError> {
    let (stdout, stderr) = output?;
    let status = child
        .wait()
        .await
        .map_err(|e| RecognizerError::Failed(e.to_string()))?;

    if !status.success() {
        let reason = stderr.trim();
        return Err(RecognizerError::Failed(if reason.is_empty() {
            format!("recognizer exited with {status}")
        } else {
            reason.to_string()
        }));
    }

    let text = stdout.trim();
    if text.is_empty() {
        return Err(RecognizerError::Failed("no-speech".into()));
    }
    Ok(text.to_string())
}

/// Find `program` as a path or on `PATH`
fn resolve_program(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }

    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
