//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::recognizer::RecognizerConfig;

/// Greeting that opens every transcript unless overridden
pub const DEFAULT_GREETING: &str =
    "Hello! I can help you with voice or text messages. Try speaking or typing your message.";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Speech recognizer settings
    pub recognizer: RecognizerConfig,

    /// Delay of the placeholder responder
    pub reply_delay: Duration,

    /// First assistant message, if any
    pub greeting: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voxchat");

        let socket_path = lookup("VOXCHAT_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("voxchat.sock"));

        let command = lookup("VOXCHAT_RECOGNIZER")
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());

        let mut recognizer = RecognizerConfig {
            command,
            ..RecognizerConfig::default()
        };
        if let Some(locale) = lookup("VOXCHAT_LOCALE").filter(|l| !l.trim().is_empty()) {
            recognizer.locale = locale.trim().to_string();
        }

        let reply_delay = match lookup("VOXCHAT_REPLY_DELAY_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid VOXCHAT_REPLY_DELAY_MS: {raw:?}"))?;
                Duration::from_millis(ms)
            }
            None => Duration::from_secs(1),
        };

        let greeting = match lookup("VOXCHAT_GREETING") {
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text),
            None => Some(DEFAULT_GREETING.to_string()),
        };

        Ok(Self {
            socket_path,
            data_dir,
            recognizer,
            reply_delay,
            greeting,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
