//! SFTP error types

use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::protocol::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SftpError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("SFTP subsystem not available: {0}")]
    SubsystemNotAvailable(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("SFTP protocol error: {0}")]
    ProtocolError(String),

    #[error("Write failed for {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("File too large for preview: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SftpError {
    /// Attach the remote path to a protocol-level failure.
    pub fn from_remote(err: SftpErrorInner, path: &str) -> Self {
        match &err {
            SftpErrorInner::Status(status) => match status.status_code {
                StatusCode::NoSuchFile => SftpError::FileNotFound(path.to_string()),
                StatusCode::PermissionDenied => SftpError::PermissionDenied(path.to_string()),
                _ => SftpError::ProtocolError(format!("{}: {}", path, err)),
            },
            _ => SftpError::ProtocolError(format!("{}: {}", path, err)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            SftpError::FileNotFound(_) => true,
            SftpError::IoError(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
