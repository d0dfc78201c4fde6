//! SSH Error types

use thiserror::Error;

use crate::config::SshConfigError;
use crate::sftp::SftpError;

use super::auth::AuthError;

/// Transport-level failures from dialing and authenticating one hop
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Disconnected")]
    Disconnected,

    #[error("SSH Agent error: {0}")]
    AgentError(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

/// Why [`Connector::connect`](super::Connector::connect) gave up
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] SshConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to connect to {host}: {source}")]
    Dial {
        host: String,
        #[source]
        source: SshError,
    },

    #[error("SFTP session failed: {0}")]
    Sftp(#[from] SftpError),

    #[error("Connection cancelled by user")]
    Cancelled,
}

impl ConnectError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectError::Cancelled)
    }
}

impl serde::Serialize for ConnectError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
