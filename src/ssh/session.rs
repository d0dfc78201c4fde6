//! SSH Session
//!
//! A connected host: the SSH transport, the proxy it was tunneled through
//! (if any) and the SFTP client layered on top. Browsing, transfers and the
//! WebDAV bridge all share the one SFTP handle.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::connect::Transport;
use super::error::SshError;
use crate::config::ConnectionParams;
use crate::sftp::RemoteFs;

pub struct Session {
    params: ConnectionParams,
    transport: Box<dyn Transport>,
    proxy: Option<Box<dyn Transport>>,
    sftp: Arc<dyn RemoteFs>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("alias", &self.params.alias)
            .field("hostname", &self.params.hostname)
            .field("tunneled", &self.is_tunneled())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        params: ConnectionParams,
        transport: Box<dyn Transport>,
        proxy: Option<Box<dyn Transport>>,
        sftp: Arc<dyn RemoteFs>,
    ) -> Self {
        Self {
            params,
            transport,
            proxy,
            sftp,
        }
    }

    pub fn alias(&self) -> &str {
        &self.params.alias
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn is_tunneled(&self) -> bool {
        self.proxy.is_some()
    }

    /// Shared SFTP handle
    pub fn sftp(&self) -> Arc<dyn RemoteFs> {
        self.sftp.clone()
    }

    /// Close SFTP, then the transport, then the proxy.
    ///
    /// Every layer is closed even if an earlier one fails; the first error
    /// is returned.
    pub async fn close(self) -> Result<(), SshError> {
        info!("Closing session {}", self.params.alias);
        let mut first_error = None;

        if let Err(e) = self.sftp.close().await {
            warn!("Failed to close SFTP for {}: {}", self.params.alias, e);
        }

        if let Err(e) = self.transport.close().await {
            first_error.get_or_insert(e);
        }

        if let Some(proxy) = &self.proxy {
            if let Err(e) = proxy.close().await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("Dropping session {}", self.params.alias);
    }
}
