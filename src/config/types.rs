//! Persisted application settings

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root of `~/.oxidescout/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub version: u32,

    /// Hosts the user had open when the last session ended
    #[serde(default)]
    pub open_hosts: Vec<String>,

    /// Overrides `~/.ssh/config`
    #[serde(default)]
    pub ssh_config_path: Option<PathBuf>,

    #[serde(default)]
    pub webdav: WebDavSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            open_hosts: Vec::new(),
            ssh_config_path: None,
            webdav: WebDavSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Record a newly opened host, most recent last, without duplicates.
    pub fn remember_host(&mut self, alias: &str) {
        self.open_hosts.retain(|h| h != alias);
        self.open_hosts.push(alias.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDavSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// 0 picks an ephemeral port
    #[serde(default)]
    pub port: u16,

    /// Short-circuit Finder's `.DS_Store` / `._*` probes
    #[serde(default = "default_skip_metadata_probes")]
    pub skip_metadata_probes: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_skip_metadata_probes() -> bool {
    cfg!(target_os = "macos")
}

impl Default for WebDavSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: 0,
            skip_metadata_probes: default_skip_metadata_probes(),
        }
    }
}
