//! File transfers and text editing over a [`RemoteFs`]
//!
//! Directory transfers walk the tree depth first and mirror it on the other
//! side. A remote path ending in `/` is treated as a directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::SftpError;
use super::path_utils::{file_name, join_remote_path, resolve_link_target, trim_trailing_slash};
use super::remote::RemoteFs;
use super::types::{detect_and_decode, encode_to_encoding, is_likely_text, TextContent, TransferSummary};

/// Largest file [`read_text`] will load
pub const MAX_TEXT_SIZE: u64 = 10 * 1024 * 1024;

/// Download a remote file or directory into `local_dir`.
///
/// `remote_path` names a directory when it ends in `/` or stats as one; the
/// directory is recreated under `local_dir` with its own name.
///
/// Symlinks are followed: linked files are copied as regular files and
/// linked directories are descended into, except links leading back into
/// a directory already on the current path. Broken links are skipped.
pub async fn download(
    remote: &dyn RemoteFs,
    remote_path: &str,
    local_dir: &Path,
) -> Result<TransferSummary, SftpError> {
    let mut summary = TransferSummary::default();
    let name = file_name(remote_path).to_string();

    let is_dir = remote_path.ends_with('/') || remote.stat(remote_path).await?.is_dir;
    if !is_dir {
        let target = local_dir.join(&name);
        summary.bytes += download_file(remote, remote_path, &target).await?;
        summary.files += 1;
        return Ok(summary);
    }

    let root = trim_trailing_slash(remote_path).to_string();
    let mut pending = vec![(root.clone(), local_dir.join(&name))];
    let mut followed: HashSet<String> = HashSet::new();
    followed.insert(root);

    while let Some((remote_dir, local_dir)) = pending.pop() {
        tokio::fs::create_dir_all(&local_dir).await?;
        summary.directories += 1;

        for entry in remote.read_dir(&remote_dir).await? {
            let child_remote = join_remote_path(&remote_dir, &entry.name);
            let child_local = local_dir.join(&entry.name);

            if entry.is_dir {
                pending.push((child_remote, child_local));
            } else if entry.is_symlink {
                let metadata = match remote.stat(&child_remote).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Skipping broken symlink {}: {}", child_remote, e);
                        continue;
                    }
                };

                if !metadata.is_dir {
                    summary.bytes += download_file(remote, &child_remote, &child_local).await?;
                    summary.files += 1;
                    continue;
                }

                let target = resolve_link_target(&remote_dir, &remote.read_link(&child_remote).await?);
                let target = trim_trailing_slash(&target).to_string();
                if leads_into(&child_remote, &target) || !followed.insert(target.clone()) {
                    warn!("Skipping symlink loop {} -> {}", child_remote, target);
                    continue;
                }
                debug!("Following directory symlink {} -> {}", child_remote, target);
                pending.push((child_remote, child_local));
            } else {
                summary.bytes += download_file(remote, &child_remote, &child_local).await?;
                summary.files += 1;
            }
        }
    }

    info!(
        "Downloaded {} files in {} directories from {}",
        summary.files, summary.directories, remote_path
    );
    Ok(summary)
}

/// True when `target` is `path` itself or one of its ancestors.
fn leads_into(path: &str, target: &str) -> bool {
    target == "/" || path == target || path.starts_with(&format!("{}/", target))
}

async fn download_file(
    remote: &dyn RemoteFs,
    remote_path: &str,
    local_path: &Path,
) -> Result<u64, SftpError> {
    debug!("Downloading {} -> {:?}", remote_path, local_path);

    let mut reader = remote.open_read(remote_path).await?;
    let mut file = tokio::fs::File::create(local_path).await?;
    let copied = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;

    Ok(copied)
}

/// Upload a local file or directory tree into `remote_dir`.
pub async fn upload(
    remote: &dyn RemoteFs,
    local_path: &Path,
    remote_dir: &str,
) -> Result<TransferSummary, SftpError> {
    let mut summary = TransferSummary::default();
    let base_name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            SftpError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no file name in {:?}", local_path),
            ))
        })?;
    let remote_root = join_remote_path(trim_trailing_slash(remote_dir), &base_name);

    if !tokio::fs::metadata(local_path).await?.is_dir() {
        summary.bytes += upload_file(remote, local_path, &remote_root).await?;
        summary.files += 1;
        return Ok(summary);
    }

    // walkdir yields parents before children
    let entries: Vec<(PathBuf, bool)> = WalkDir::new(local_path)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            entry
                .map(|e| (e.path().to_path_buf(), e.file_type().is_dir()))
                .map_err(|e| SftpError::IoError(std::io::Error::other(e.to_string())))
        })
        .collect::<Result<_, _>>()?;

    for (path, is_dir) in entries {
        let relative = path.strip_prefix(local_path).unwrap_or(&path);
        let remote_path = relative
            .components()
            .fold(remote_root.clone(), |acc, c| {
                join_remote_path(&acc, &c.as_os_str().to_string_lossy())
            });

        if is_dir {
            ensure_remote_dir(remote, &remote_path).await?;
            summary.directories += 1;
        } else {
            summary.bytes += upload_file(remote, &path, &remote_path).await?;
            summary.files += 1;
        }
    }

    info!(
        "Uploaded {} files in {} directories to {}",
        summary.files, summary.directories, remote_root
    );
    Ok(summary)
}

async fn upload_file(
    remote: &dyn RemoteFs,
    local_path: &Path,
    remote_path: &str,
) -> Result<u64, SftpError> {
    debug!("Uploading {:?} -> {}", local_path, remote_path);

    let mut file = tokio::fs::File::open(local_path).await?;
    let mut writer = remote.create(remote_path).await?;
    let copied = tokio::io::copy(&mut file, &mut writer).await?;
    writer.shutdown().await?;

    Ok(copied)
}

/// Create `path` unless a directory is already there.
pub async fn ensure_remote_dir(remote: &dyn RemoteFs, path: &str) -> Result<(), SftpError> {
    match remote.create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) => match remote.stat(path).await {
            Ok(meta) if meta.is_dir => Ok(()),
            _ => Err(e),
        },
    }
}

/// Load a remote file for viewing or editing.
pub async fn read_text(remote: &dyn RemoteFs, path: &str) -> Result<TextContent, SftpError> {
    let metadata = remote.stat(path).await?;
    if metadata.size > MAX_TEXT_SIZE {
        return Err(SftpError::FileTooLarge {
            size: metadata.size,
            limit: MAX_TEXT_SIZE,
        });
    }

    let mut reader = remote.open_read(path).await?;
    let mut data = Vec::with_capacity(metadata.size as usize);
    reader.read_to_end(&mut data).await?;

    if !is_likely_text(&data) {
        return Ok(TextContent::Binary {
            size: data.len() as u64,
        });
    }

    let (data, encoding, has_bom) = detect_and_decode(&data);
    Ok(TextContent::Text {
        data,
        encoding,
        has_bom,
    })
}

/// Replace a remote file's contents.
pub async fn write_content(
    remote: &dyn RemoteFs,
    path: &str,
    content: &[u8],
) -> Result<(), SftpError> {
    let write_error = |e: std::io::Error| SftpError::WriteError {
        path: path.to_string(),
        message: e.to_string(),
    };

    let mut writer = remote.create(path).await?;
    writer.write_all(content).await.map_err(write_error)?;
    writer.shutdown().await.map_err(write_error)?;

    info!("Wrote {} bytes to {}", content.len(), path);
    Ok(())
}

/// Save edited text in the encoding it was read with.
pub async fn write_text(
    remote: &dyn RemoteFs,
    path: &str,
    text: &str,
    encoding: &str,
) -> Result<(), SftpError> {
    write_content(remote, path, &encode_to_encoding(text, encoding)).await
}
