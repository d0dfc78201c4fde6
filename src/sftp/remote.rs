//! Remote filesystem seam
//!
//! Everything above the SSH layer talks to the remote host through
//! [`RemoteFs`]. [`SftpClient`] implements it on top of `russh-sftp`; tests
//! substitute in-memory trees.

use async_trait::async_trait;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::error::SftpError;
use super::types::{RemoteDirEntry, RemoteMetadata};

pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// SFTP primitives used by browsing, transfers and the WebDAV bridge.
///
/// Calls on distinct paths may run concurrently; calls on the same path
/// are not ordered.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Entries of a directory, without `.` and `..`.
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError>;

    async fn read_link(&self, path: &str) -> Result<String, SftpError>;

    /// Attributes of `path`, following symlinks.
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError>;

    /// Attributes of `path` itself; a symlink is reported as a link.
    async fn symlink_metadata(&self, path: &str) -> Result<RemoteMetadata, SftpError>;

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError>;

    /// Create or truncate. Writers must be shut down to commit.
    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    async fn create_dir(&self, path: &str) -> Result<(), SftpError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError>;

    async fn close(&self) -> Result<(), SftpError>;
}

fn metadata_from_attrs(attrs: &FileAttributes) -> RemoteMetadata {
    RemoteMetadata {
        is_dir: attrs.is_dir(),
        is_symlink: attrs.is_symlink(),
        size: attrs.size.unwrap_or(0),
        modified: attrs.mtime.map(|t| t as i64).unwrap_or(0),
        permissions: attrs.permissions.unwrap_or(0) & 0o7777,
    }
}

/// [`RemoteFs`] over a live SFTP subsystem channel
pub struct SftpClient {
    sftp: RusshSftpSession,
}

impl SftpClient {
    /// Request the `sftp` subsystem on an open session channel.
    pub async fn open(channel: russh::Channel<russh::client::Msg>) -> Result<Self, SftpError> {
        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened");
        Ok(Self { sftp })
    }
}

#[async_trait]
impl RemoteFs for SftpClient {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError> {
        debug!("Listing directory: {}", path);

        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;

        Ok(read_dir
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                let metadata = entry.metadata();
                Some(RemoteDirEntry {
                    name,
                    is_dir: metadata.is_dir(),
                    is_symlink: metadata.is_symlink(),
                })
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String, SftpError> {
        self.sftp
            .read_link(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;
        Ok(metadata_from_attrs(&attrs))
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;
        Ok(metadata_from_attrs(&attrs))
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| SftpError::from_remote(e, path))?;
        Ok(Box::new(file))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| SftpError::from_remote(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| SftpError::from_remote(e, from))
    }

    async fn close(&self) -> Result<(), SftpError> {
        self.sftp
            .close()
            .await
            .map_err(|e| SftpError::ChannelError(e.to_string()))
    }
}
