//! OxideScout - browse and edit files on SSH hosts
//!
//! Resolves hosts from the OpenSSH client config, connects (optionally
//! through one jump host), lists and transfers files over SFTP and can
//! expose a remote tree as a local WebDAV share.

// Use mimalloc as the global allocator for better performance
// with high-frequency small allocations (SFTP packets, listing entries)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod commands;
pub mod config;
pub mod frontend;
pub mod sftp;
pub mod ssh;
pub mod webdav;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
