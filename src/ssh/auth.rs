//! Auth Strategy Engine
//!
//! Chooses the credentials for a host and drives the single password
//! fallback.
//!
//! 1. An explicitly configured identity file is the only key source. If it
//!    cannot be read or parsed the alias fails; the agent is not consulted.
//! 2. Otherwise every identity held by the SSH agent is offered.
//! 3. When the handshake with those methods fails, the user is asked for a
//!    password once and the handshake is retried with it appended.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::{PrivateKey, PublicKey};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::agent::SshAgentClient;
use crate::config::ConnectionParams;

/// Errors from assembling credentials
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read identity file {path:?}: {source}")]
    IdentityUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse identity file {path:?}: {message}")]
    IdentityInvalid { path: PathBuf, message: String },

    #[error("Identity file {0:?} is passphrase protected")]
    IdentityEncrypted(PathBuf),

    #[error("SSH Agent not available: {0}")]
    AgentUnavailable(String),

    #[error("SSH Agent has no keys loaded")]
    NoAgentKeys,
}

impl AuthError {
    /// Agent problems may still be rescued by a password; a broken
    /// identity file may not.
    pub fn allows_password_fallback(&self) -> bool {
        matches!(self, AuthError::AgentUnavailable(_) | AuthError::NoAgentKeys)
    }
}

pub type SharedAgent = Arc<Mutex<SshAgentClient>>;

/// One way of proving identity to a server
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<PrivateKey>),
    AgentKeys {
        agent: SharedAgent,
        keys: Vec<PublicKey>,
    },
    Password(Arc<Zeroizing<String>>),
}

impl AuthMethod {
    pub fn password(secret: String) -> Self {
        AuthMethod::Password(Arc::new(Zeroizing::new(secret)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::AgentKeys { .. } => "agent",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().as_str())
                .finish(),
            AuthMethod::AgentKeys { keys, .. } => {
                f.debug_struct("AgentKeys").field("keys", &keys.len()).finish()
            }
            AuthMethod::Password(_) => f.write_str("Password(***)"),
        }
    }
}

/// Where credentials come from besides the config file
#[derive(Debug, Clone, Default)]
pub struct AuthEnvironment {
    pub agent_socket: Option<PathBuf>,
}

impl AuthEnvironment {
    pub fn from_env() -> Self {
        #[cfg(windows)]
        let agent_socket = Some(PathBuf::from(r"\\.\pipe\openssh-ssh-agent"));

        #[cfg(not(windows))]
        let agent_socket = std::env::var_os("SSH_AUTH_SOCK").map(PathBuf::from);

        Self { agent_socket }
    }
}

/// Produce the key-based method set for `params`.
pub async fn build_methods(
    params: &ConnectionParams,
    env: &AuthEnvironment,
) -> Result<Vec<AuthMethod>, AuthError> {
    if let Some(path) = &params.identity_file {
        let key = load_identity(path).await?;
        info!("Using identity file {:?} for {}", path, params.alias);
        return Ok(vec![AuthMethod::PublicKey(Arc::new(key))]);
    }

    let socket = env
        .agent_socket
        .as_deref()
        .ok_or_else(|| AuthError::AgentUnavailable("SSH_AUTH_SOCK is not set".to_string()))?;

    let mut agent = SshAgentClient::connect(socket)
        .await
        .map_err(|e| AuthError::AgentUnavailable(e.to_string()))?;
    let keys = agent
        .identities()
        .await
        .map_err(|e| AuthError::AgentUnavailable(e.to_string()))?;

    if keys.is_empty() {
        return Err(AuthError::NoAgentKeys);
    }

    debug!("SSH Agent holds {} key(s)", keys.len());
    Ok(vec![AuthMethod::AgentKeys {
        agent: Arc::new(Mutex::new(agent)),
        keys,
    }])
}

/// Read and decode an unencrypted private key.
pub async fn load_identity(path: &Path) -> Result<PrivateKey, AuthError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AuthError::IdentityUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

    parse_identity(&data, path)
}

fn parse_identity(data: &str, path: &Path) -> Result<PrivateKey, AuthError> {
    match russh::keys::decode_secret_key(data, None) {
        Ok(key) => Ok(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            Err(AuthError::IdentityEncrypted(path.to_path_buf()))
        }
        Err(e) => Err(AuthError::IdentityInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// Asks the user for a password. An empty answer cancels.
#[async_trait]
pub trait PasswordPrompt: Send + Sync {
    async fn prompt_password(&self, alias: &str, hostname: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    TryKeyBased,
    AwaitingPassword,
    RetryWithPassword,
    Authenticated,
    Failed,
}

/// Per-handshake authentication progress.
///
/// ```text
/// TryKeyBased ──fail──▶ AwaitingPassword ──password──▶ RetryWithPassword
///      │                       │                             │
///      ok                    empty                      ok / fail
///      ▼                       ▼                             ▼
/// Authenticated             Failed               Authenticated / Failed
/// ```
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    state: AuthState,
    methods: Vec<AuthMethod>,
}

impl AuthAttempt {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        Self {
            state: AuthState::TryKeyBased,
            methods,
        }
    }

    /// No key-based methods are available; go straight to the prompt.
    pub fn password_only() -> Self {
        Self {
            state: AuthState::AwaitingPassword,
            methods: Vec::new(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    pub fn succeeded(&mut self) {
        self.state = AuthState::Authenticated;
    }

    /// Record a failed handshake and return the next state.
    pub fn handshake_failed(&mut self) -> AuthState {
        self.state = match self.state {
            AuthState::TryKeyBased => AuthState::AwaitingPassword,
            _ => AuthState::Failed,
        };
        self.state
    }

    /// Feed the prompt's answer. Empty means the user gave up.
    pub fn supply_password(&mut self, password: String) -> AuthState {
        if self.state != AuthState::AwaitingPassword {
            return self.state;
        }
        if password.is_empty() {
            self.state = AuthState::Failed;
        } else {
            self.methods.push(AuthMethod::password(password));
            self.state = AuthState::RetryWithPassword;
        }
        self.state
    }
}
