//! WebDAV gateway commands

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WebDavSettings;
use crate::ssh::Session;
use crate::webdav::{BridgeConfig, ServerConfig, SftpBridge, WebDavServer};

/// Start a gateway over `session`'s SFTP handle. The server stops when the
/// returned handle is stopped or dropped.
pub async fn start_webdav(
    session: &Session,
    settings: &WebDavSettings,
) -> Result<WebDavServer, std::io::Error> {
    if !settings.bind_address.is_loopback() {
        warn!(
            "WebDAV gateway for {} binds {}: it has no authentication and is reachable from other hosts",
            session.alias(),
            settings.bind_address
        );
    }

    let bridge = Arc::new(SftpBridge::new(session.sftp(), BridgeConfig::from(settings)));
    let server = WebDavServer::start(bridge, ServerConfig::from(settings)).await?;

    info!("WebDAV gateway for {} at {}", session.alias(), server.url());
    Ok(server)
}
