//! WebDAV gateway
//!
//! Exposes a remote tree to local WebDAV clients. Requests go to the remote
//! host over SFTP and are answered from an in-memory mirror; nothing is
//! written to the local disk.

mod action;
mod bridge;
mod error;
mod locks;
mod mirror;
mod server;

pub use action::BridgeAction;
pub use bridge::{BridgeConfig, SftpBridge};
pub use error::{WebDavError, WebDavResult};
pub use locks::LockRegistry;
pub use mirror::Mirror;
pub use server::{ServerConfig, WebDavServer};
