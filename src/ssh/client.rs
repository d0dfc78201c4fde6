//! SSH Client implementation using russh
//!
//! [`RusshDialer`] opens TCP connections, [`RusshTransport`] tunnels further
//! hops through `direct-tcpip` channels (`connect_stream`) and hosts the SFTP
//! subsystem.
//!
//! Host keys are NOT verified: every server key is accepted and its
//! fingerprint logged at `warn`. A man-in-the-middle can therefore read
//! and alter the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::ssh_key::HashAlg;
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use tracing::{debug, info, warn};

use super::auth::AuthMethod;
use super::connect::{Dialer, Endpoint, Transport};
use super::error::SshError;
use crate::sftp::{RemoteFs, SftpClient, SftpError};

fn client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Client handler for russh callbacks
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "Accepting unverified host key for {}:{} ({} {})",
            self.host,
            self.port,
            server_public_key.algorithm().as_str(),
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}

/// Try `methods` in order until the server accepts one.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    methods: &[AuthMethod],
) -> Result<(), SshError> {
    for method in methods {
        let accepted = match method {
            AuthMethod::PublicKey(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key.clone(), hash_alg))
                    .await?
                    .success()
            }
            AuthMethod::AgentKeys { agent, keys } => {
                agent.lock().await.authenticate(handle, user, keys).await?
            }
            AuthMethod::Password(password) => handle
                .authenticate_password(user, password.as_str())
                .await?
                .success(),
        };

        if accepted {
            info!("SSH authentication successful ({})", method.kind());
            return Ok(());
        }
        debug!("{} authentication rejected for {}", method.kind(), user);
    }

    Err(SshError::AuthenticationFailed(format!(
        "server rejected all {} method(s) for {}",
        methods.len(),
        user
    )))
}

/// Dials hosts directly over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshDialer;

#[async_trait]
impl Dialer for RusshDialer {
    async fn dial(
        &self,
        target: &Endpoint,
        methods: &[AuthMethod],
    ) -> Result<Box<dyn Transport>, SshError> {
        info!("Connecting to SSH server at {}", target.address());

        let handler = ClientHandler::new(target.host.clone(), target.port);
        let mut handle = client::connect(
            client_config(),
            (target.host.as_str(), target.port),
            handler,
        )
        .await
        .map_err(|e| SshError::ConnectionFailed(format!("{}: {}", target.address(), e)))?;

        debug!("SSH handshake completed");
        if let Err(e) = authenticate(&mut handle, &target.user, methods).await {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(e);
        }

        Ok(Box::new(RusshTransport {
            endpoint: target.clone(),
            handle,
        }))
    }
}

/// One authenticated russh connection
pub struct RusshTransport {
    endpoint: Endpoint,
    handle: Handle<ClientHandler>,
}

#[async_trait]
impl Transport for RusshTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn dial_through(
        &self,
        target: &Endpoint,
        methods: &[AuthMethod],
    ) -> Result<Box<dyn Transport>, SshError> {
        info!(
            "Connecting to {} via {} (SSH-over-SSH)",
            target.address(),
            self.endpoint.address()
        );

        let channel = self
            .handle
            .channel_open_direct_tcpip(target.host.as_str(), target.port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| {
                SshError::ChannelError(format!(
                    "Failed to open tunnel to {}: {}",
                    target.address(),
                    e
                ))
            })?;

        let handler = ClientHandler::new(target.host.clone(), target.port);
        let mut handle = client::connect_stream(client_config(), channel.into_stream(), handler)
            .await
            .map_err(|e| SshError::ConnectionFailed(format!("{}: {}", target.address(), e)))?;

        debug!("SSH handshake via stream completed");
        if let Err(e) = authenticate(&mut handle, &target.user, methods).await {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(e);
        }

        Ok(Box::new(RusshTransport {
            endpoint: target.clone(),
            handle,
        }))
    }

    async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SftpError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::ChannelError(e.to_string()))?;

        Ok(Arc::new(SftpClient::open(channel).await?))
    }

    async fn close(&self) -> Result<(), SshError> {
        debug!("Disconnecting from {}", self.endpoint.address());
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}
