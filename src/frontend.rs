//! User-facing collaborators
//!
//! The core never talks to the user directly. It asks a [`Frontend`] for
//! passwords, reports failures through it and hands it the list of open
//! hosts to remember.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::ConfigStorage;
use crate::ssh::{PasswordPrompt, PasswordRequest};

pub trait Frontend: PasswordPrompt {
    fn display_error(&self, err: &dyn Error);

    /// Persist the hosts open right now, most recent last.
    fn persist_open_hosts(&self, hosts: &[String]);
}

/// Answer queued password requests with `frontend`, one at a time.
pub async fn serve_prompts(
    mut requests: mpsc::Receiver<PasswordRequest>,
    frontend: Arc<dyn Frontend>,
) {
    while let Some(request) = requests.recv().await {
        debug!("Password requested for {}", request.alias);
        let password = frontend
            .prompt_password(&request.alias, &request.hostname)
            .await;
        request.respond(password);
    }
}

/// Error and its causes, outermost first
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Terminal implementation: stdin/stderr prompts, config.json persistence.
pub struct TerminalFrontend {
    storage: ConfigStorage,
    pending_saves: Mutex<Vec<JoinHandle<()>>>,
}

impl TerminalFrontend {
    pub fn new(storage: ConfigStorage) -> Self {
        Self {
            storage,
            pending_saves: Mutex::new(Vec::new()),
        }
    }

    /// Wait for queued writes of `config.json`.
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending_saves.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Config save task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl PasswordPrompt for TerminalFrontend {
    async fn prompt_password(&self, alias: &str, hostname: &str) -> String {
        let prompt = format!("Password for {} ({}): ", alias, hostname);

        // rpassword blocks on the terminal
        match tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await {
            Ok(Ok(password)) => password,
            Ok(Err(e)) => {
                warn!("Failed to read password: {}", e);
                String::new()
            }
            Err(e) => {
                error!("Password prompt task failed: {}", e);
                String::new()
            }
        }
    }
}

impl Frontend for TerminalFrontend {
    fn display_error(&self, err: &dyn Error) {
        error!("{}", error_chain(err));
        eprintln!("error: {}", error_chain(err));
    }

    fn persist_open_hosts(&self, hosts: &[String]) {
        let storage = self.storage.clone();
        let hosts = hosts.to_vec();
        let handle = tokio::spawn(async move {
            if let Err(e) = storage.save_open_hosts(&hosts).await {
                warn!("Failed to persist open hosts: {}", e);
            }
        });
        self.pending_saves.lock().push(handle);
    }
}
