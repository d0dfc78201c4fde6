//! Concurrent Directory Fetcher
//!
//! One directory read, then a fixed pool of workers resolves the entries.
//!
//! ```text
//!   read_dir ──▶ work queue ──▶ worker × 10 ──▶ results ──▶ listing (mutex)
//!                                   │
//!                          symlink: read_link + stat
//! ```
//!
//! Entries arrive in whatever order the workers finish; callers needing a
//! stable order use [`DirectoryListing::sorted`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::SftpError;
use super::path_utils::{ensure_trailing_slash, join_remote_path, resolve_link_target};
use super::remote::RemoteFs;
use super::types::{DirectoryListing, FileEntry, RemoteDirEntry};

/// Worker pool size, independent of the entry count
pub const LISTING_WORKERS: usize = 10;

pub struct DirectoryFetcher {
    remote: Arc<dyn RemoteFs>,
}

impl DirectoryFetcher {
    pub fn new(remote: Arc<dyn RemoteFs>) -> Self {
        Self { remote }
    }

    /// List `path`. Fails only if the directory itself cannot be read.
    pub async fn fetch(&self, path: &str) -> Result<DirectoryListing, SftpError> {
        let entries = self.remote.read_dir(path).await?;
        let total = entries.len();
        debug!("Resolving {} entries of {}", total, path);

        let (work_tx, work_rx) = mpsc::channel::<RemoteDirEntry>(total.max(1));
        for entry in entries {
            // Buffer holds every entry, so this never waits
            if work_tx.send(entry).await.is_err() {
                break;
            }
        }
        drop(work_tx);

        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<FileEntry>(LISTING_WORKERS);

        let mut workers = JoinSet::new();
        for _ in 0..LISTING_WORKERS {
            let remote = self.remote.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let dir = path.to_string();

            workers.spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(entry) = next else { break };

                    let resolved = resolve_entry(remote.as_ref(), &dir, entry).await;
                    if result_tx.send(resolved).await.is_err() {
                        break;
                    }
                }
            });
        }

        // Results close once every worker is done
        tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!("Listing worker failed: {}", e);
                }
            }
            drop(result_tx);
        });

        let listing = Mutex::new(DirectoryListing::new());
        listing.lock().ensure_path(path);
        while let Some(entry) = result_rx.recv().await {
            listing.lock().push(path, entry);
        }

        Ok(listing.into_inner())
    }
}

/// Convenience wrapper around [`DirectoryFetcher::fetch`].
pub async fn fetch_listing(
    remote: Arc<dyn RemoteFs>,
    path: &str,
) -> Result<DirectoryListing, SftpError> {
    DirectoryFetcher::new(remote).fetch(path).await
}

async fn resolve_entry(remote: &dyn RemoteFs, dir: &str, entry: RemoteDirEntry) -> FileEntry {
    let full_path = join_remote_path(dir, &entry.name);

    if entry.is_symlink {
        return match link_directory_target(remote, dir, &full_path).await {
            Ok(Some(target)) => FileEntry {
                name: entry.name,
                full_path: ensure_trailing_slash(&target),
                is_dir: true,
                is_link: true,
            },
            Ok(None) => FileEntry {
                name: entry.name,
                full_path,
                is_dir: false,
                is_link: true,
            },
            Err(e) => {
                debug!("Unresolvable link {}: {}", full_path, e);
                FileEntry {
                    name: entry.name,
                    full_path,
                    is_dir: false,
                    is_link: true,
                }
            }
        };
    }

    if entry.is_dir {
        FileEntry {
            name: entry.name,
            full_path: ensure_trailing_slash(&full_path),
            is_dir: true,
            is_link: false,
        }
    } else {
        FileEntry {
            name: entry.name,
            full_path,
            is_dir: false,
            is_link: false,
        }
    }
}

/// The resolved target of a link, if it is a directory.
async fn link_directory_target(
    remote: &dyn RemoteFs,
    dir: &str,
    link_path: &str,
) -> Result<Option<String>, SftpError> {
    let target = remote.read_link(link_path).await?;
    let resolved = resolve_link_target(dir, &target);
    let metadata = remote.stat(&resolved).await?;
    Ok(metadata.is_dir.then_some(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::testing::MemoryRemoteFs;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_large_directory_with_linked_subdirectories() {
        let mut fs = MemoryRemoteFs::new()
            .dir("/srv")
            .dir("/data")
            .dir("/data/a")
            .dir("/data/b")
            .dir("/data/c");
        for i in 0..30 {
            fs = fs.file(&format!("/srv/file{:02}.txt", i), b"x");
        }
        for i in 0..4 {
            fs = fs.dir(&format!("/srv/sub{}", i));
        }
        fs = fs
            .link("/srv/link-a", "/data/a")
            .link("/srv/link-b", "../data/b")
            .link("/srv/link-c", "/data/c/");

        let listing = fetch_listing(Arc::new(fs), "/srv").await.unwrap();
        let entries = listing.get("/srv").unwrap();

        assert_eq!(entries.len(), 37);
        let linked_dirs: Vec<_> = entries.iter().filter(|e| e.is_link && e.is_dir).collect();
        assert_eq!(linked_dirs.len(), 3);
        assert!(linked_dirs.iter().all(|e| e.full_path.ends_with('/')));

        let link_b = entries.iter().find(|e| e.name == "link-b").unwrap();
        assert_eq!(link_b.full_path, "/data/b/");

        let sub = entries.iter().find(|e| e.name == "sub0").unwrap();
        assert_eq!(sub.full_path, "/srv/sub0/");
        assert!(sub.is_dir && !sub.is_link);
    }

    #[tokio::test]
    async fn test_names_match_directory_read() {
        for n in [0usize, 1, 9, 10, 11, 25] {
            let mut fs = MemoryRemoteFs::new().dir("/d");
            for i in 0..n {
                fs = fs.file(&format!("/d/f{}", i), b"");
            }

            let listing = fetch_listing(Arc::new(fs), "/d").await.unwrap();
            let names: HashSet<_> = listing
                .get("/d")
                .unwrap()
                .iter()
                .map(|e| e.name.clone())
                .collect();
            let expected: HashSet<_> = (0..n).map(|i| format!("f{}", i)).collect();

            assert_eq!(listing.get("/d").unwrap().len(), n);
            assert_eq!(names, expected);
        }
    }

    #[tokio::test]
    async fn test_symlink_to_file_and_broken_link() {
        let fs = MemoryRemoteFs::new()
            .dir("/d")
            .file("/d/real.txt", b"data")
            .link("/d/alias.txt", "real.txt")
            .link("/d/dangling", "/nowhere")
            .link("/d/unreadable", "/d");
        fs.broken_links.lock().push("/d/unreadable".to_string());

        let listing = fetch_listing(Arc::new(fs), "/d").await.unwrap();
        let entries = listing.get("/d").unwrap();
        assert_eq!(entries.len(), 4);

        for name in ["alias.txt", "dangling", "unreadable"] {
            let entry = entries.iter().find(|e| e.name == name).unwrap();
            assert!(entry.is_link);
            assert!(!entry.is_dir);
            assert_eq!(entry.full_path, format!("/d/{}", name));
        }
    }

    #[tokio::test]
    async fn test_unreadable_directory_is_error() {
        let fs = MemoryRemoteFs::new();
        assert!(fetch_listing(Arc::new(fs), "/missing").await.is_err());
    }
}
