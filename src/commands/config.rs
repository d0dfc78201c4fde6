//! Host configuration commands

use serde::Serialize;

use super::AppState;
use crate::config::{ConnectionParams, SshConfigError};

/// A resolved alias and, when tunneled, its jump host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    #[serde(flatten)]
    pub params: ConnectionParams,
    pub jump: Option<ConnectionParams>,
}

/// Concrete aliases from the SSH config, in file order.
pub async fn list_hosts(state: &AppState) -> Result<Vec<String>, SshConfigError> {
    state.connector().resolver().list_aliases().await
}

pub async fn resolve_host(state: &AppState, alias: &str) -> Result<HostSummary, SshConfigError> {
    let resolver = state.connector().resolver();
    let params = resolver.resolve(alias).await?;
    let jump = resolver.resolve_jump(&params).await?;
    Ok(HostSummary { params, jump })
}

/// Hosts that were open when the last run ended
pub fn open_hosts(state: &AppState) -> Vec<String> {
    state.config_snapshot().open_hosts
}
