//! SSH Agent Client
//!
//! Lists agent-held identities and delegates challenge signing to the agent
//! via russh's [`AgentClient`].
//!
//! # Platform Support
//! - **Unix/Linux/macOS**: the Unix domain socket named by `SSH_AUTH_SOCK`
//! - **Windows**: the OpenSSH named pipe `\\.\pipe\openssh-ssh-agent`
//!
//! # The `AgentSigner` wrapper
//!
//! russh's own `impl Signer for AgentClient` borrows the server-provided key
//! across an await point, which makes the authentication future `!Send`.
//! [`AgentSigner`] clones the key before the async block so the future only
//! captures owned values.

use std::future::Future;
use std::path::Path;

use russh::client::Handle;
use russh::keys::agent::client::{AgentClient, AgentStream};
use russh::keys::{ssh_key, PublicKey};
use russh::{AgentAuthError, CryptoVec, Signer};
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

type DynAgent = AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>;

struct AgentSigner<'a> {
    agent: &'a mut DynAgent,
}

impl Signer for AgentSigner<'_> {
    type Error = AgentAuthError;

    fn auth_publickey_sign(
        &mut self,
        key: &ssh_key::PublicKey,
        hash_alg: Option<ssh_key::HashAlg>,
        to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let key_owned = key.clone();
        async move {
            self.agent
                .sign_request(&key_owned, hash_alg, to_sign)
                .await
                .map_err(Into::into)
        }
    }
}

/// Connection to a running SSH agent
pub struct SshAgentClient {
    agent: DynAgent,
}

impl SshAgentClient {
    /// Connect to the agent listening at `socket`.
    pub async fn connect(socket: &Path) -> Result<Self, SshError> {
        info!("Connecting to SSH Agent at {:?}", socket);

        #[cfg(unix)]
        {
            let agent = AgentClient::connect_uds(socket).await.map_err(|e| {
                SshError::AgentError(format!("Failed to connect to SSH Agent: {}", e))
            })?;
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(windows)]
        {
            let agent = AgentClient::connect_named_pipe(socket)
                .await
                .map_err(|e| {
                    SshError::AgentError(format!(
                        "Failed to connect to SSH Agent via named pipe: {}",
                        e
                    ))
                })?;
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(SshError::AgentError(
                "SSH Agent is not supported on this platform".to_string(),
            ))
        }
    }

    /// Public keys the agent can sign with
    pub async fn identities(&mut self) -> Result<Vec<PublicKey>, SshError> {
        self.agent
            .request_identities()
            .await
            .map_err(|e| SshError::AgentError(format!("Failed to list agent keys: {}", e)))
    }

    /// Offer `keys` one by one; the agent signs the server challenge.
    ///
    /// Returns `Ok(false)` when the server rejected every key.
    pub async fn authenticate(
        &mut self,
        handle: &mut Handle<ClientHandler>,
        username: &str,
        keys: &[PublicKey],
    ) -> Result<bool, SshError> {
        info!(
            "SSH Agent offers {} key(s), attempting authentication",
            keys.len()
        );

        for key in keys {
            debug!("Trying agent key: {} ({})", key.algorithm(), key.comment());

            match handle
                .authenticate_publickey_with(
                    username,
                    key.clone(),
                    None,
                    &mut AgentSigner {
                        agent: &mut self.agent,
                    },
                )
                .await
            {
                Ok(result) if result.success() => {
                    info!("SSH Agent authentication succeeded with key: {}", key.comment());
                    return Ok(true);
                }
                Ok(_) => debug!("Key rejected by server: {}", key.comment()),
                Err(e) => warn!("Agent signing error for key {}: {}", key.comment(), e),
            }
        }

        Ok(false)
    }
}
