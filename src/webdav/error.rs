//! Error handling and mapping for the WebDAV bridge.
//!
//! Bridge failures are answered directly with a status code; they are never
//! forwarded to the mirror and never stop the server.

use dav_server::body::Body;
use hyper::{Response, StatusCode};
use thiserror::Error;

use crate::sftp::SftpError;

#[derive(Debug, Error)]
pub enum WebDavError {
    /// SFTP call on the remote host failed.
    #[error("Remote operation failed: {0}")]
    Remote(#[from] SftpError),

    #[error("Destination header is required")]
    MissingDestination,

    #[error("Invalid Destination header: {0}")]
    InvalidDestination(String),

    #[error("Resource is locked: {0}")]
    Locked(String),

    #[error("{0} is not supported")]
    NotImplemented(&'static str),

    #[error("Failed to read request body: {0}")]
    Body(String),

    /// Internal request against the in-memory mirror failed.
    #[error("Mirror error: {0}")]
    Mirror(String),
}

impl WebDavError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebDavError::Remote(e) => remote_status(e),
            WebDavError::MissingDestination | WebDavError::InvalidDestination(_) => {
                StatusCode::BAD_REQUEST
            }
            WebDavError::Locked(_) => StatusCode::LOCKED,
            WebDavError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            WebDavError::Body(_) => StatusCode::BAD_REQUEST,
            WebDavError::Mirror(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response carrying the error message.
    pub fn into_response(self) -> Response<Body> {
        let status = self.status();
        status_response(status, self.to_string())
    }
}

fn remote_status(e: &SftpError) -> StatusCode {
    match e {
        SftpError::FileNotFound(_) => StatusCode::NOT_FOUND,
        SftpError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        SftpError::AlreadyExists(_) => StatusCode::METHOD_NOT_ALLOWED,
        SftpError::NotADirectory(_) => StatusCode::CONFLICT,
        SftpError::ChannelError(_)
        | SftpError::ProtocolError(_)
        | SftpError::SubsystemNotAvailable(_) => StatusCode::BAD_GATEWAY,
        SftpError::IoError(io) => match io.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        SftpError::WriteError { .. } | SftpError::FileTooLarge { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn status_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

pub type WebDavResult<T> = Result<T, WebDavError>;
