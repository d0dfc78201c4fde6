//! Shared harness for gateway integration tests.
//!
//! `TreeFs` is an in-memory remote host; `TestServer` runs the real HTTP
//! server over it and wraps a reqwest client.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method, Response, StatusCode};
use tokio::io::AsyncWrite;

use oxidescout_lib::sftp::{
    RemoteDirEntry, RemoteFs, RemoteMetadata, RemoteReader, RemoteWriter, SftpError,
};
use oxidescout_lib::webdav::{BridgeConfig, ServerConfig, SftpBridge, WebDavServer};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

type Tree = Arc<Mutex<BTreeMap<String, Node>>>;

/// Flat path → node map standing in for a remote host
#[derive(Default)]
pub struct TreeFs {
    tree: Tree,
    renames: Mutex<Vec<(String, String)>>,
}

impl TreeFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.tree.lock().insert("/".to_string(), Node::Dir);
        fs
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.tree.lock().insert(path.to_string(), Node::Dir);
        self
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.tree
            .lock()
            .insert(path.to_string(), Node::File(content.to_vec()));
        self
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.tree.lock().get(path), Some(Node::Dir))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().contains_key(path)
    }

    pub fn renames(&self) -> Vec<(String, String)> {
        self.renames.lock().clone()
    }

    fn node(&self, path: &str) -> Result<Node, SftpError> {
        self.tree
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }
}

#[async_trait]
impl RemoteFs for TreeFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SftpError> {
        if !matches!(self.node(path)?, Node::Dir) {
            return Err(SftpError::NotADirectory(path.to_string()));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        Ok(self
            .tree
            .lock()
            .iter()
            .filter_map(|(p, node)| {
                let name = p.strip_prefix(&prefix)?;
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                Some(RemoteDirEntry {
                    name: name.to_string(),
                    is_dir: matches!(node, Node::Dir),
                    is_symlink: false,
                })
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String, SftpError> {
        Err(SftpError::ProtocolError(format!("not a link: {}", path)))
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        Ok(match self.node(path)? {
            Node::Dir => RemoteMetadata {
                is_dir: true,
                ..Default::default()
            },
            Node::File(data) => RemoteMetadata {
                size: data.len() as u64,
                ..Default::default()
            },
        })
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        self.stat(path).await
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        match self.node(path)? {
            Node::File(data) => Ok(Box::new(io::Cursor::new(data))),
            Node::Dir => Err(SftpError::ProtocolError(format!("is a directory: {}", path))),
        }
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        Ok(Box::new(TreeWriter {
            tree: self.tree.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.tree
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.remove_file(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        let mut tree = self.tree.lock();
        if tree.contains_key(path) {
            return Err(SftpError::AlreadyExists(path.to_string()));
        }
        tree.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        let mut tree = self.tree.lock();
        let node = tree
            .remove(from)
            .ok_or_else(|| SftpError::FileNotFound(from.to_string()))?;
        tree.insert(to.to_string(), node);
        self.renames.lock().push((from.to_string(), to.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), SftpError> {
        Ok(())
    }
}

struct TreeWriter {
    tree: Tree,
    path: String,
    buffer: Vec<u8>,
}

impl AsyncWrite for TreeWriter {
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

pub const LOCK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner>integration</D:owner>
</D:lockinfo>"#;

/// Gateway over a [`TreeFs`] plus an HTTP client
pub struct TestServer {
    server: Option<WebDavServer>,
    client: Client,
    pub base_url: String,
    pub fs: Arc<TreeFs>,
}

impl TestServer {
    pub async fn start(fs: TreeFs) -> Self {
        let fs = Arc::new(fs);
        let bridge = Arc::new(SftpBridge::new(
            fs.clone(),
            BridgeConfig {
                skip_metadata_probes: true,
            },
        ));

        let server = WebDavServer::start(bridge, ServerConfig::default())
            .await
            .expect("Failed to start WebDAV server");
        let base_url = server.url();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let test_server = Self {
            server: Some(server),
            client,
            base_url,
            fs,
        };
        test_server.wait_ready().await;
        test_server
    }

    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self
                .client
                .request(Method::from_bytes(b"PROPFIND").unwrap(), &self.base_url)
                .header("Depth", "0")
                .send()
                .await
            {
                if resp.status() == StatusCode::MULTI_STATUS {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready in time");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(Method::from_bytes(method.as_bytes()).unwrap(), self.url(path))
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn propfind(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self
            .request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed");
        let status = resp.status();
        (status, resp.text().await.unwrap_or_default())
    }

    pub async fn lock(&self, path: &str) -> StatusCode {
        self.request("LOCK", path)
            .header("Content-Type", "application/xml")
            .body(LOCK_BODY)
            .send()
            .await
            .expect("LOCK request failed")
            .status()
    }

    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Response {
        builder.send().await.expect("request failed")
    }

    pub async fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
    }
}
