//! In-memory [`RemoteFs`] for unit tests

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use super::error::SftpError;
use super::path_utils::{join_remote_path, resolve_link_target, trim_trailing_slash};
use super::remote::{RemoteFs, RemoteReader, RemoteWriter};
use super::types::{RemoteDirEntry, RemoteMetadata};

#[derive(Debug, Clone)]
pub enum Node {
    Dir,
    File(Vec<u8>),
    Link(String),
}

type Tree = Arc<Mutex<BTreeMap<String, Node>>>;

#[derive(Default)]
pub struct MemoryRemoteFs {
    tree: Tree,
    calls: Mutex<Vec<String>>,
    /// Paths whose read_link fails
    pub broken_links: Mutex<Vec<String>>,
}

impl MemoryRemoteFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.tree.lock().insert("/".to_string(), Node::Dir);
        fs
    }

    pub fn dir(self, path: &str) -> Self {
        self.tree.lock().insert(path.to_string(), Node::Dir);
        self
    }

    pub fn file(self, path: &str, content: &[u8]) -> Self {
        self.tree
            .lock()
            .insert(path.to_string(), Node::File(content.to_vec()));
        self
    }

    pub fn link(self, path: &str, target: &str) -> Self {
        self.tree
            .lock()
            .insert(path.to_string(), Node::Link(target.to_string()));
        self
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().contains_key(path)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.calls.lock().iter().any(|c| c.starts_with(op))
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn lookup(&self, path: &str) -> Result<Node, SftpError> {
        self.tree
            .lock()
            .get(trim_trailing_slash(path))
            .cloned()
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }

    fn follow(&self, path: &str) -> Result<Node, SftpError> {
        self.resolve(path).map(|(_, node)| node)
    }

    /// Real path and node behind `path`, following links in every component.
    fn resolve(&self, path: &str) -> Result<(String, Node), SftpError> {
        let mut current = String::from("/");
        let mut node = Node::Dir;
        let mut hops = 0;
        for segment in trim_trailing_slash(path).split('/').filter(|s| !s.is_empty()) {
            current = join_remote_path(&current, segment);
            node = self.lookup(&current)?;
            while let Node::Link(target) = node {
                hops += 1;
                if hops > 8 {
                    return Err(SftpError::ProtocolError("too many links".to_string()));
                }
                let parent = current.rsplit_once('/').map(|(p, _)| p).unwrap_or("/");
                let (real, next) =
                    self.resolve(&resolve_link_target(if parent.is_empty() { "/" } else { parent }, &target))?;
                current = real;
                node = next;
            }
        }
        Ok((current, node))
    }
}

fn is_child(dir: &str, path: &str) -> Option<String> {
    let prefix = join_remote_path(trim_trailing_slash(dir), "");
    let rest = path.strip_prefix(&prefix)?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest.to_string())
    }
}

#[async_trait]
impl RemoteFs for MemoryRemoteFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError> {
        self.record(format!("read_dir {}", path));
        let real = match self.resolve(path)? {
            (real, Node::Dir) => real,
            _ => return Err(SftpError::NotADirectory(path.to_string())),
        };

        let tree = self.tree.lock();
        Ok(tree
            .iter()
            .filter_map(|(p, node)| {
                let name = is_child(&real, p)?;
                Some(RemoteDirEntry {
                    name,
                    is_dir: matches!(node, Node::Dir),
                    is_symlink: matches!(node, Node::Link(_)),
                })
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String, SftpError> {
        self.record(format!("read_link {}", path));
        if self.broken_links.lock().iter().any(|p| p == path) {
            return Err(SftpError::PermissionDenied(path.to_string()));
        }
        match self.lookup(path)? {
            Node::Link(target) => Ok(target),
            _ => Err(SftpError::ProtocolError(format!("not a link: {}", path))),
        }
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        self.record(format!("stat {}", path));
        Ok(match self.follow(path)? {
            Node::Dir => RemoteMetadata {
                is_dir: true,
                ..Default::default()
            },
            Node::File(data) => RemoteMetadata {
                size: data.len() as u64,
                ..Default::default()
            },
            Node::Link(_) => RemoteMetadata {
                is_symlink: true,
                ..Default::default()
            },
        })
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        self.record(format!("symlink_metadata {}", path));
        Ok(match self.lookup(path)? {
            Node::Dir => RemoteMetadata {
                is_dir: true,
                ..Default::default()
            },
            Node::File(data) => RemoteMetadata {
                size: data.len() as u64,
                ..Default::default()
            },
            Node::Link(_) => RemoteMetadata {
                is_symlink: true,
                ..Default::default()
            },
        })
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        self.record(format!("open_read {}", path));
        match self.follow(path)? {
            Node::File(data) => Ok(Box::new(io::Cursor::new(data))),
            _ => Err(SftpError::ProtocolError(format!("not a file: {}", path))),
        }
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        self.record(format!("create {}", path));
        Ok(Box::new(MemoryWriter {
            tree: self.tree.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("remove_file {}", path));
        self.tree
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("remove_dir {}", path));
        let path = trim_trailing_slash(path);
        let mut tree = self.tree.lock();
        match tree.get(path) {
            None => return Err(SftpError::FileNotFound(path.to_string())),
            Some(Node::Dir) => {}
            // rmdir never follows links
            Some(_) => return Err(SftpError::NotADirectory(path.to_string())),
        }
        if tree.keys().any(|p| is_child(path, p).is_some()) {
            return Err(SftpError::ProtocolError(format!("directory not empty: {}", path)));
        }
        tree.remove(path);
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        self.record(format!("create_dir {}", path));
        let mut tree = self.tree.lock();
        let path = trim_trailing_slash(path).to_string();
        if tree.contains_key(&path) {
            return Err(SftpError::AlreadyExists(path));
        }
        tree.insert(path, Node::Dir);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        self.record(format!("rename {} {}", from, to));
        let mut tree = self.tree.lock();
        let node = tree
            .remove(from)
            .ok_or_else(|| SftpError::FileNotFound(from.to_string()))?;
        tree.insert(to.to_string(), node);
        Ok(())
    }

    async fn close(&self) -> Result<(), SftpError> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Commits its buffer into the tree on shutdown.
struct MemoryWriter {
    tree: Tree,
    path: String,
    buffer: Vec<u8>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let data = self.buffer.clone();
        self.tree.lock().insert(self.path.clone(), Node::File(data));
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_dir_matches_rmdir() {
        let fs = MemoryRemoteFs::new()
            .dir("/full")
            .file("/full/f", b"x")
            .dir("/empty")
            .link("/to_empty", "/empty");

        assert!(matches!(
            fs.remove_dir("/to_empty").await,
            Err(SftpError::NotADirectory(_))
        ));
        assert!(fs.remove_dir("/full").await.is_err());
        assert!(fs.exists("/full/f"));

        fs.remove_dir("/empty").await.unwrap();
        assert!(!fs.exists("/empty"));
    }

    #[tokio::test]
    async fn test_paths_through_links() {
        let fs = MemoryRemoteFs::new()
            .dir("/data")
            .file("/data/x.txt", b"x")
            .link("/srv", "/data");

        let names: Vec<String> = fs
            .read_dir("/srv")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["x.txt"]);
        assert!(fs.stat("/srv/x.txt").await.is_ok());
        assert!(fs.symlink_metadata("/srv").await.unwrap().is_symlink);
    }
}
