//! WebDAV → SFTP bridge
//!
//! Each request is first applied to the remote host over SFTP, then handed
//! to the in-memory [`Mirror`] which produces the WebDAV response. Remote
//! failures on mutating methods are answered directly and never reach the
//! mirror.
//!
//! | method    | remote                          | mirror                      |
//! |-----------|---------------------------------|-----------------------------|
//! | PROPFIND  | list (stat only for Depth 0)    | create nodes, forward       |
//! | GET       | read whole file                 | store, forward              |
//! | PUT/POST  | stream body into file           | forward with empty body     |
//! | DELETE    | remove link, file or directory  | forward if present, else 204 |
//! | MKCOL     | create directory                | forward                     |
//! | MOVE      | rename                          | forward if present, else 201 |
//! | LOCK      | lock registry, 423 if held      | forward, release on failure |
//! | UNLOCK    | release                         | forward                     |
//! | COPY      | 501                             |                             |

use std::sync::Arc;

use bytes::Bytes;
use dav_server::body::Body;
use http_body_util::{BodyExt, Full};
use hyper::body::Body as HttpBody;
use hyper::header::{HeaderMap, CONTENT_LENGTH};
use hyper::{Request, Response, StatusCode, Uri};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::action::BridgeAction;
use super::error::{status_response, WebDavError, WebDavResult};
use super::locks::LockRegistry;
use super::mirror::{decode_path, Mirror};
use crate::config::WebDavSettings;
use crate::sftp::path_utils::{join_remote_path, parent_directory, trim_trailing_slash};
use crate::sftp::{DirectoryFetcher, RemoteFs, SftpError};

const GET_FAILURE_HINT: &str = "Files are fetched from the remote host on demand and \
kept in memory only while this gateway runs.\nThe remote file could not be read; \
check that it exists and is readable, then retry.";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Answer Finder's `.DS_Store` and `._*` probes with 404
    pub skip_metadata_probes: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            skip_metadata_probes: cfg!(target_os = "macos"),
        }
    }
}

impl From<&WebDavSettings> for BridgeConfig {
    fn from(settings: &WebDavSettings) -> Self {
        Self {
            skip_metadata_probes: settings.skip_metadata_probes,
        }
    }
}

pub struct SftpBridge {
    remote: Arc<dyn RemoteFs>,
    fetcher: DirectoryFetcher,
    mirror: Mirror,
    locks: LockRegistry,
    config: BridgeConfig,
}

impl SftpBridge {
    pub fn new(remote: Arc<dyn RemoteFs>, config: BridgeConfig) -> Self {
        Self {
            fetcher: DirectoryFetcher::new(remote.clone()),
            remote,
            mirror: Mirror::new(),
            locks: LockRegistry::new(),
            config,
        }
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let action = BridgeAction::from_method(req.method());
        let Some(path) = decode_path(req.uri().path()) else {
            return status_response(StatusCode::BAD_REQUEST, "Invalid path encoding");
        };

        if self.config.skip_metadata_probes && is_metadata_probe(&path) {
            debug!("Ignoring metadata probe {} {}", req.method(), path);
            return status_response(StatusCode::NOT_FOUND, Body::empty());
        }

        if action.is_mutating() {
            info!("{} {}", req.method(), path);
        } else {
            debug!("{} {}", req.method(), path);
        }

        let method = req.method().clone();
        let result = match action {
            BridgeAction::Propfind => {
                let depth_zero = depth_is_zero(req.headers());
                if let Err(e) = self.refresh(&path, depth_zero).await {
                    warn!("Failed to refresh {} from remote: {}", path, e);
                }
                Ok(self.mirror.serve(req).await)
            }
            BridgeAction::Get => self.get(&path, req).await,
            BridgeAction::Upload => self.upload(&path, req).await,
            BridgeAction::Delete => self.delete(&path, req).await,
            BridgeAction::Mkcol => self.mkcol(&path, req).await,
            BridgeAction::Move => self.rename(&path, req).await,
            BridgeAction::Lock => self.lock(&path, req).await,
            BridgeAction::Unlock => {
                self.locks.unlock(&path);
                Ok(self.mirror.serve(req).await)
            }
            BridgeAction::Copy => Err(WebDavError::NotImplemented("COPY")),
            BridgeAction::Forward => Ok(self.mirror.serve(req).await),
        };

        result.unwrap_or_else(|e| {
            warn!("{} {} failed: {}", method, path, e);
            e.into_response()
        })
    }

    /// Mirror the remote node at `path` and, unless `depth_zero`, its children.
    async fn refresh(&self, path: &str, depth_zero: bool) -> WebDavResult<()> {
        let remote_path = trim_trailing_slash(path);
        let metadata = self.remote.stat(remote_path).await?;

        if !metadata.is_dir {
            return self.mirror.ensure_placeholder(remote_path).await;
        }

        self.mirror.ensure_dir(remote_path).await?;
        if depth_zero {
            return Ok(());
        }

        let listing = self.fetcher.fetch(remote_path).await?;
        let entries = listing.get(remote_path).unwrap_or_default();
        debug!("Mirroring {} entries of {}", entries.len(), remote_path);

        for entry in entries {
            let child = join_remote_path(remote_path, &entry.name);
            if entry.is_dir {
                self.mirror.ensure_dir(&child).await?;
            } else {
                self.mirror.ensure_placeholder(&child).await?;
            }
        }
        Ok(())
    }

    async fn get<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let content = match self.read_remote(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to download {}: {}", path, e);
                return Ok(status_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    GET_FAILURE_HINT,
                ));
            }
        };

        debug!("Fetched {} bytes of {}", content.len(), path);
        self.mirror.store(path, Bytes::from(content)).await?;
        Ok(self.mirror.serve(req).await)
    }

    async fn read_remote(&self, path: &str) -> Result<Vec<u8>, SftpError> {
        let mut reader = self.remote.open_read(path).await?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;
        Ok(content)
    }

    async fn upload<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (mut parts, mut body) = req.into_parts();

        let mut writer = self.remote.create(path).await?;
        let mut written = 0usize;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| WebDavError::Body(e.to_string()))?;
            if let Ok(data) = frame.into_data() {
                writer.write_all(&data).await.map_err(SftpError::from)?;
                written += data.len();
            }
        }
        writer.shutdown().await.map_err(SftpError::from)?;
        info!("Uploaded {} bytes to {}", written, path);

        self.mirror.ensure_dir_all(&parent_directory(path)).await?;
        parts.headers.remove(CONTENT_LENGTH);
        let forwarded = Request::from_parts(parts, Full::new(Bytes::new()));
        Ok(self.mirror.serve(forwarded).await)
    }

    async fn delete<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let remote_path = trim_trailing_slash(path);
        // A link is removed itself, even when it points at a directory
        let metadata = self.remote.symlink_metadata(remote_path).await?;
        if metadata.is_dir && !metadata.is_symlink {
            self.remote.remove_dir(remote_path).await?;
        } else {
            self.remote.remove_file(remote_path).await?;
        }

        if self.mirror.exists(path).await? {
            Ok(self.mirror.serve(req).await)
        } else {
            Ok(status_response(StatusCode::NO_CONTENT, Body::empty()))
        }
    }

    async fn mkcol<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        self.remote.create_dir(trim_trailing_slash(path)).await?;
        self.mirror.ensure_dir_all(&parent_directory(path)).await?;
        Ok(self.mirror.serve(req).await)
    }

    async fn rename<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let destination = destination_path(req.headers())?;
        let from = trim_trailing_slash(path);
        let to = trim_trailing_slash(&destination);

        self.remote.rename(from, to).await?;
        info!("Moved {} -> {}", from, to);

        if self.mirror.exists(path).await? {
            self.mirror.ensure_dir_all(&parent_directory(to)).await?;
            Ok(self.mirror.serve(req).await)
        } else {
            Ok(status_response(StatusCode::CREATED, Body::empty()))
        }
    }

    async fn lock<B>(&self, path: &str, req: Request<B>) -> WebDavResult<Response<Body>>
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        if !self.locks.try_lock(path) {
            return Err(WebDavError::Locked(path.to_string()));
        }

        if let Err(e) = self.mirror.ensure_dir_all(&parent_directory(path)).await {
            self.locks.unlock(path);
            return Err(e);
        }
        let response = self.mirror.serve(req).await;
        if !response.status().is_success() {
            debug!("LOCK {} refused by mirror ({}), releasing", path, response.status());
            self.locks.unlock(path);
        }
        Ok(response)
    }
}

/// Finder metadata: `.DS_Store` or an AppleDouble `._*` file anywhere in the path.
fn is_metadata_probe(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment == ".DS_Store" || segment.starts_with("._"))
}

fn depth_is_zero(headers: &HeaderMap) -> bool {
    headers
        .get("Depth")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Decoded path of the `Destination` header (absolute URL or bare path).
fn destination_path(headers: &HeaderMap) -> WebDavResult<String> {
    let value = headers
        .get("Destination")
        .ok_or(WebDavError::MissingDestination)?
        .to_str()
        .map_err(|e| WebDavError::InvalidDestination(e.to_string()))?
        .trim();

    if value.is_empty() {
        return Err(WebDavError::MissingDestination);
    }

    let uri: Uri = value
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| WebDavError::InvalidDestination(e.to_string()))?;

    decode_path(uri.path())
        .filter(|p| p.starts_with('/'))
        .ok_or_else(|| WebDavError::InvalidDestination(value.to_string()))
}
