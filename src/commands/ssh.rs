//! Session commands

use tracing::{info, warn};

use super::{AppState, CommandError};
use crate::ssh::Session;

/// Connect to `alias` and record it among the open hosts.
pub async fn connect(state: &AppState, alias: &str) -> Result<Session, CommandError> {
    let session = state.connector().connect(alias).await?;

    state.update_config(|config| config.remember_host(alias));
    let hosts = state.config_snapshot().open_hosts;
    state.frontend().persist_open_hosts(&hosts);

    Ok(session)
}

/// Close `session`. Failures are reported but not returned.
pub async fn disconnect(state: &AppState, session: Session) {
    let alias = session.alias().to_string();
    match session.close().await {
        Ok(()) => info!("Disconnected from {}", alias),
        Err(e) => {
            warn!("Error while closing {}: {}", alias, e);
            state.frontend().display_error(&e);
        }
    }
}
