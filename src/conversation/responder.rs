//! Reply generation
//!
//! `Responder` is the seam where a real assistant backend plugs in. The
//! daemon ships `EchoResponder`, which waits a fixed delay and answers with
//! a templated acknowledgement of the input.

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised while producing a reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponderError {
    #[error("responder failed: {0}")]
    Failed(String),

    #[error("responder returned an empty reply")]
    EmptyReply,
}

/// Produces reply text for one user input
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply for trimmed, non-empty `input`
    async fn generate(&self, input: &str) -> Result<String, ResponderError>;
}

/// Fixed-delay placeholder that echoes the input back
#[derive(Debug, Clone)]
pub struct EchoResponder {
    delay: Duration,
}

impl EchoResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The deterministic reply for `input`
    pub fn reply_for(input: &str) -> String {
        format!(
            "I received your message: \"{input}\". This is a simulated response. \
             In a real application, this would be processed by an AI assistant."
        )
    }
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn generate(&self, input: &str) -> Result<String, ResponderError> {
        tokio::time::sleep(self.delay).await;
        Ok(Self::reply_for(input))
    }
}
