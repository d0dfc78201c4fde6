//! Configuration Management Module
//!
//! Resolves SSH client configuration and persists the small amount of
//! application state kept between runs.

pub mod ssh_config;
pub mod storage;
pub mod types;

pub use ssh_config::{
    default_ssh_config_path, ConnectionParams, SshConfigError, SshConfigHost, SshConfigResolver,
};
pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{ConfigFile, WebDavSettings, CONFIG_VERSION};
