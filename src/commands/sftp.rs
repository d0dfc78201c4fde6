//! Remote file commands
//!
//! Browsing, text editing and transfers over the session's SFTP handle.

use std::path::Path;

use tracing::info;

use crate::sftp::{
    self, path_utils::normalize_remote_path, DirectoryFetcher, FileEntry, SftpError, TextContent,
    TransferSummary,
};
use crate::ssh::Session;

/// Entries of `path`. `sorted` puts directories first, then orders by name.
pub async fn list_dir(
    session: &Session,
    path: &str,
    sorted: bool,
) -> Result<Vec<FileEntry>, SftpError> {
    let path = normalize_remote_path(path);
    let listing = DirectoryFetcher::new(session.sftp()).fetch(&path).await?;

    Ok(if sorted {
        listing.sorted(&path)
    } else {
        listing.get(&path).map(<[_]>::to_vec).unwrap_or_default()
    })
}

pub async fn read_file(session: &Session, path: &str) -> Result<TextContent, SftpError> {
    sftp::read_text(session.sftp().as_ref(), path).await
}

pub async fn write_file(session: &Session, path: &str, content: &[u8]) -> Result<(), SftpError> {
    sftp::write_content(session.sftp().as_ref(), path, content).await?;
    info!("Saved {} bytes to {}", content.len(), path);
    Ok(())
}

/// Copy a remote file or tree into `local_dir`.
pub async fn download(
    session: &Session,
    remote_path: &str,
    local_dir: &Path,
) -> Result<TransferSummary, SftpError> {
    sftp::download(session.sftp().as_ref(), remote_path, local_dir).await
}

/// Copy a local file or tree into `remote_dir`.
pub async fn upload(
    session: &Session,
    local_path: &Path,
    remote_dir: &str,
) -> Result<TransferSummary, SftpError> {
    sftp::upload(session.sftp().as_ref(), local_path, remote_dir).await
}
