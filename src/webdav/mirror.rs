//! In-memory mirror of the remote tree
//!
//! A `dav-server` handler over `MemFs` answers every WebDAV request the
//! bridge forwards. The bridge fills it lazily: directory listings create
//! empty nodes, downloads store full content. All mutation goes through
//! internal HTTP requests against the same handler, so the mirror only ever
//! holds what a WebDAV client could have put there.

use bytes::Bytes;
use dav_server::body::Body;
use dav_server::fakels::FakeLs;
use dav_server::memfs::MemFs;
use dav_server::DavHandler;
use http_body_util::Full;
use hyper::body::Body as HttpBody;
use hyper::{Method, Request, Response, StatusCode, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, trace};

use super::error::{WebDavError, WebDavResult};
use crate::sftp::path_utils::{ensure_trailing_slash, parent_directory};

/// Characters escaped in mirror request paths; `/` stays literal.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

/// Decode a request path. `None` if the escapes are not UTF-8.
pub fn decode_path(path: &str) -> Option<String> {
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|p| p.into_owned())
}

fn method(name: &'static str) -> WebDavResult<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| WebDavError::Mirror(e.to_string()))
}

#[derive(Clone)]
pub struct Mirror {
    handler: DavHandler,
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror {
    pub fn new() -> Self {
        let handler = DavHandler::builder()
            .filesystem(MemFs::new())
            .locksystem(FakeLs::new())
            .build_handler();
        Self { handler }
    }

    /// Answer a client request from the mirror.
    pub async fn serve<B>(&self, req: Request<B>) -> Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        self.handler.handle(req).await
    }

    async fn internal(
        &self,
        method: Method,
        path: &str,
        depth: Option<&'static str>,
        body: Bytes,
    ) -> WebDavResult<StatusCode> {
        let uri: Uri = encode_path(path)
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| WebDavError::Mirror(e.to_string()))?;

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if let Some(depth) = depth {
            builder = builder.header("Depth", depth);
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| WebDavError::Mirror(e.to_string()))?;

        let status = self.handler.handle(req).await.status();
        trace!("mirror {} {} -> {}", method, path, status);
        Ok(status)
    }

    pub async fn exists(&self, path: &str) -> WebDavResult<bool> {
        let status = self
            .internal(method("PROPFIND")?, path, Some("0"), Bytes::new())
            .await?;
        Ok(status == StatusCode::MULTI_STATUS)
    }

    /// Create `path` and every missing ancestor as collections.
    pub async fn ensure_dir_all(&self, path: &str) -> WebDavResult<()> {
        let mut current = String::from("/");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push_str(segment);
            current.push('/');

            let status = self
                .internal(method("MKCOL")?, &current, None, Bytes::new())
                .await?;
            match status {
                StatusCode::CREATED => debug!("mirror: created {}", current),
                // Already there
                StatusCode::METHOD_NOT_ALLOWED => {}
                other => {
                    return Err(WebDavError::Mirror(format!(
                        "MKCOL {} returned {}",
                        current, other
                    )))
                }
            }
        }
        Ok(())
    }

    /// Empty file at `path` unless something is already there.
    pub async fn ensure_placeholder(&self, path: &str) -> WebDavResult<()> {
        if self.exists(path).await? {
            return Ok(());
        }
        self.store(path, Bytes::new()).await
    }

    /// Write `content` to `path`, creating parent collections.
    pub async fn store(&self, path: &str, content: Bytes) -> WebDavResult<()> {
        self.ensure_dir_all(&parent_directory(path)).await?;

        let status = self.internal(Method::PUT, path, None, content).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(WebDavError::Mirror(format!("PUT {} returned {}", path, status)))
        }
    }

    /// Ensure the collection a client is about to address exists.
    pub async fn ensure_dir(&self, path: &str) -> WebDavResult<()> {
        self.ensure_dir_all(&ensure_trailing_slash(path)).await
    }
}
