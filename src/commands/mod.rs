//! Command handlers
//!
//! Each front-end action maps to one async function here. Handlers take the
//! shared [`AppState`] (or an open [`Session`](crate::ssh::Session)) and
//! return typed results; presentation is left to the caller.

pub mod config;
pub mod sftp;
pub mod ssh;
pub mod webdav;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::{ConfigFile, ConfigStorage, SshConfigError, SshConfigResolver, StorageError};
use crate::frontend::Frontend;
use crate::sftp::SftpError;
use crate::ssh::{AuthEnvironment, ConnectError, Connector, Dialer, PasswordPrompt, SshError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] SshConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by all handlers
pub struct AppState {
    connector: Connector,
    storage: ConfigStorage,
    config: RwLock<ConfigFile>,
    frontend: Arc<dyn Frontend>,
}

impl AppState {
    /// Load `config.json` and build the connector.
    ///
    /// `ssh_config` overrides both `~/.ssh/config` and the path saved in
    /// `config.json`.
    pub async fn load(
        storage: ConfigStorage,
        ssh_config: Option<PathBuf>,
        dialer: Arc<dyn Dialer>,
        prompt: Arc<dyn PasswordPrompt>,
        frontend: Arc<dyn Frontend>,
    ) -> Result<Self, CommandError> {
        let config = storage.load().await?;

        let mut resolver = SshConfigResolver::from_env()?;
        if let Some(path) = ssh_config.or_else(|| config.ssh_config_path.clone()) {
            resolver = resolver.with_config_path(path);
        }

        let connector = Connector::new(resolver, AuthEnvironment::from_env(), dialer, prompt);
        Ok(Self::new(connector, storage, config, frontend))
    }

    pub fn new(
        connector: Connector,
        storage: ConfigStorage,
        config: ConfigFile,
        frontend: Arc<dyn Frontend>,
    ) -> Self {
        Self {
            connector,
            storage,
            config: RwLock::new(config),
            frontend,
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn frontend(&self) -> &Arc<dyn Frontend> {
        &self.frontend
    }

    pub fn storage(&self) -> &ConfigStorage {
        &self.storage
    }

    /// Snapshot of the persisted settings
    pub fn config_snapshot(&self) -> ConfigFile {
        self.config.read().clone()
    }

    pub fn update_config<F>(&self, f: F)
    where
        F: FnOnce(&mut ConfigFile),
    {
        let mut config = self.config.write();
        f(&mut config);
    }
}
