//! Password prompt plumbing
//!
//! The connection task cannot talk to the user directly. It pushes a
//! [`PasswordRequest`] onto a channel and waits for the frontend to answer
//! through the request's responder.
//!
//! ```text
//! Connector                         Frontend
//!    │── PasswordRequest ─────────────▶│
//!    │                                 │ ask user
//!    │◀─────────── respond(password) ──│
//! ```
//!
//! A request the frontend drops, or does not answer within
//! [`PROMPT_TIMEOUT`], reads as an empty password, which cancels the
//! connection.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::auth::PasswordPrompt;

/// How long a connection waits for the user
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// One outstanding password question
#[derive(Debug)]
pub struct PasswordRequest {
    pub alias: String,
    pub hostname: String,
    responder: oneshot::Sender<String>,
}

impl PasswordRequest {
    pub fn respond(self, password: String) {
        // Receiver gone means the connection already timed out
        let _ = self.responder.send(password);
    }

    pub fn cancel(self) {
        self.respond(String::new());
    }
}

/// [`PasswordPrompt`] that forwards questions over a channel
#[derive(Debug, Clone)]
pub struct PromptBroker {
    requests: mpsc::Sender<PasswordRequest>,
    timeout: Duration,
}

impl PromptBroker {
    /// Create a broker and the receiving end the frontend serves.
    pub fn channel() -> (Self, mpsc::Receiver<PasswordRequest>) {
        Self::with_timeout(PROMPT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> (Self, mpsc::Receiver<PasswordRequest>) {
        let (requests, rx) = mpsc::channel(4);
        (Self { requests, timeout }, rx)
    }
}

#[async_trait]
impl PasswordPrompt for PromptBroker {
    async fn prompt_password(&self, alias: &str, hostname: &str) -> String {
        let (tx, rx) = oneshot::channel();
        let request = PasswordRequest {
            alias: alias.to_string(),
            hostname: hostname.to_string(),
            responder: tx,
        };

        if self.requests.send(request).await.is_err() {
            warn!("No frontend is listening for password prompts");
            return String::new();
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(password)) => password,
            Ok(Err(_)) => {
                debug!("Password prompt for {} dropped", alias);
                String::new()
            }
            Err(_) => {
                warn!(
                    "Password prompt for {} timed out ({}s)",
                    alias,
                    self.timeout.as_secs()
                );
                String::new()
            }
        }
    }
}
