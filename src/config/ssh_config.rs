//! SSH Config Resolver
//!
//! Parses `~/.ssh/config` into host blocks and answers two questions:
//! which aliases can be connected to, and what the connection parameters
//! of a given alias are.
//!
//! Resolution follows OpenSSH: blocks are scanned top to bottom, a block
//! applies when one of its patterns matches the alias, and the first value
//! seen for a directive wins. Directives placed before the first `Host`
//! line apply to every alias.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// SSH config parser errors
#[derive(Debug, thiserror::Error)]
pub enum SshConfigError {
    #[error("Failed to determine home directory")]
    NoHomeDir,

    #[error("SSH config not found at {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid value for {key} of host {alias}: {value}")]
    InvalidValue {
        alias: String,
        key: &'static str,
        value: String,
    },

    #[error("Unknown host alias: {0}")]
    UnknownAlias(String),
}

/// One `Host` block: its patterns plus the directives this crate cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfigHost {
    /// Patterns after the `Host` keyword (may contain `*`, `?` or a leading `!`)
    pub patterns: Vec<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    /// Raw `Port` value, validated at resolve time
    pub port: Option<String>,
    pub identity_file: Option<String>,
    pub proxy_jump: Option<String>,
    /// Line the block starts on (0 for the implicit global block)
    #[serde(skip)]
    pub line: usize,
    /// `Match` blocks never apply; kept only so their directives don't leak
    #[serde(skip)]
    pub is_match_block: bool,
}

impl SshConfigHost {
    /// Patterns that name exactly one host
    pub fn specific_aliases(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .map(String::as_str)
            .filter(|p| is_specific_alias(p))
    }

    /// OpenSSH pattern-list semantics: any positive match, no negated match.
    pub fn matches(&self, alias: &str) -> bool {
        if self.is_match_block {
            return false;
        }

        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if pattern_matches(negated, alias) {
                    return false;
                }
            } else if pattern_matches(pattern, alias) {
                matched = true;
            }
        }
        matched
    }

    fn set(&mut self, key: &str, value: &str) {
        // First obtained value wins, within a block as well as across blocks
        let slot = match key {
            "hostname" => &mut self.hostname,
            "user" => &mut self.user,
            "port" => &mut self.port,
            "identityfile" => &mut self.identity_file,
            "proxyjump" => &mut self.proxy_jump,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

/// A pattern is a connectable alias iff it has no glob metacharacters.
pub fn is_specific_alias(pattern: &str) -> bool {
    !pattern.contains('*') && !pattern.contains('?') && !pattern.starts_with('!')
}

fn pattern_matches(pattern: &str, alias: &str) -> bool {
    if is_specific_alias(pattern) {
        return pattern.eq_ignore_ascii_case(alias);
    }
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches_with(
            alias,
            glob::MatchOptions {
                case_sensitive: false,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        ),
        Err(_) => false,
    }
}

/// Resolved per-alias connection attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub proxy_jump: Option<String>,
}

impl ConnectionParams {
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Jump host named by the `ProxyJump` directive: `[user@]alias[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyJumpHost {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl ProxyJumpHost {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let (user, host_port) = match value.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, value),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse().ok()?)),
            None => (host_port, None),
        };

        if host.is_empty() {
            return None;
        }

        Some(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

/// Get default SSH config path
pub fn default_ssh_config_path() -> Result<PathBuf, SshConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".ssh").join("config"))
        .ok_or(SshConfigError::NoHomeDir)
}

/// Parse SSH config content string into host blocks.
///
/// The first block is the implicit global block (empty pattern list
/// treated as `*`) holding directives that precede any `Host` line.
pub fn parse_ssh_config_content(content: &str) -> Result<Vec<SshConfigHost>, SshConfigError> {
    let mut hosts = vec![SshConfigHost {
        patterns: vec!["*".to_string()],
        ..Default::default()
    }];

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = split_directive(line).ok_or_else(|| SshConfigError::Parse {
            line: line_no,
            message: format!("directive '{}' has no value", line),
        })?;
        let key = key.to_lowercase();

        match key.as_str() {
            "host" => {
                let patterns = split_patterns(value, line_no)?;
                if patterns.is_empty() {
                    return Err(SshConfigError::Parse {
                        line: line_no,
                        message: "Host line without patterns".to_string(),
                    });
                }
                hosts.push(SshConfigHost {
                    patterns,
                    line: line_no,
                    ..Default::default()
                });
            }
            "match" => {
                hosts.push(SshConfigHost {
                    line: line_no,
                    is_match_block: true,
                    ..Default::default()
                });
            }
            "include" => {
                debug!("Ignoring Include directive at line {}", line_no);
            }
            _ => {
                let value = unquote(value, line_no)?;
                if let Some(block) = hosts.last_mut() {
                    block.set(&key, &value);
                }
            }
        }
    }

    Ok(hosts)
}

/// Split "Key Value" or "Key=Value"
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let key_end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let key = &line[..key_end];
    let rest = line[key_end..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();

    if key.is_empty() || rest.is_empty() {
        None
    } else {
        Some((key, rest))
    }
}

fn split_patterns(value: &str, line: usize) -> Result<Vec<String>, SshConfigError> {
    let mut patterns = Vec::new();
    let mut rest = value.trim();

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').ok_or_else(|| SshConfigError::Parse {
                line,
                message: "unbalanced quotes".to_string(),
            })?;
            patterns.push(quoted[..end].to_string());
            rest = quoted[end + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            patterns.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }

    Ok(patterns.into_iter().filter(|p| !p.is_empty()).collect())
}

fn unquote(value: &str, line: usize) -> Result<String, SshConfigError> {
    match value.strip_prefix('"') {
        Some(inner) => inner
            .strip_suffix('"')
            .map(str::to_string)
            .ok_or_else(|| SshConfigError::Parse {
                line,
                message: "unbalanced quotes".to_string(),
            }),
        None => Ok(value.to_string()),
    }
}

/// Answers alias queries against one SSH config file.
///
/// The config path, home directory and current user are explicit inputs so
/// resolution never depends on the process environment.
#[derive(Debug, Clone)]
pub struct SshConfigResolver {
    config_path: PathBuf,
    home_dir: PathBuf,
    current_user: String,
}

impl SshConfigResolver {
    pub fn new(config_path: PathBuf, home_dir: PathBuf, current_user: impl Into<String>) -> Self {
        Self {
            config_path,
            home_dir,
            current_user: current_user.into(),
        }
    }

    /// Resolver for `~/.ssh/config` of the user running the process.
    pub fn from_env() -> Result<Self, SshConfigError> {
        let home = dirs::home_dir().ok_or(SshConfigError::NoHomeDir)?;
        Ok(Self::new(
            home.join(".ssh").join("config"),
            home,
            whoami::username(),
        ))
    }

    /// Same home and user, different config file.
    pub fn with_config_path(mut self, config_path: PathBuf) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn load(&self) -> Result<Vec<SshConfigHost>, SshConfigError> {
        let content = match tokio::fs::read_to_string(&self.config_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SshConfigError::NotFound(self.config_path.clone()));
            }
            Err(e) => return Err(SshConfigError::Io(e)),
        };
        parse_ssh_config_content(&content)
    }

    /// Every specific alias in the file, each exactly once, in file order.
    pub async fn list_aliases(&self) -> Result<Vec<String>, SshConfigError> {
        let hosts = self.load().await?;
        let mut aliases: Vec<String> = Vec::new();

        for alias in hosts.iter().flat_map(SshConfigHost::specific_aliases) {
            if !aliases.iter().any(|a| a == alias) {
                aliases.push(alias.to_string());
            }
        }

        Ok(aliases)
    }

    pub async fn resolve(&self, alias: &str) -> Result<ConnectionParams, SshConfigError> {
        let hosts = self.load().await?;
        self.resolve_in(&hosts, alias)
    }

    /// Resolve the immediate jump host of `params`, if any.
    ///
    /// Only one hop is followed: the returned params never carry a
    /// `proxy_jump` of their own.
    pub async fn resolve_jump(
        &self,
        params: &ConnectionParams,
    ) -> Result<Option<ConnectionParams>, SshConfigError> {
        let Some(jump_value) = params.proxy_jump.as_deref() else {
            return Ok(None);
        };

        let invalid = || SshConfigError::InvalidValue {
            alias: params.alias.clone(),
            key: "ProxyJump",
            value: jump_value.to_string(),
        };

        if jump_value.contains(',') {
            return Err(invalid());
        }
        let hop = ProxyJumpHost::parse(jump_value).ok_or_else(invalid)?;

        let hosts = self.load().await?;
        let mut jump = match self.resolve_in(&hosts, &hop.host) {
            Ok(p) => p,
            // A bare hostname that has no block of its own is still dialable
            Err(SshConfigError::UnknownAlias(_)) => ConnectionParams {
                alias: hop.host.clone(),
                hostname: hop.host.clone(),
                port: DEFAULT_PORT,
                user: self.current_user.clone(),
                identity_file: None,
                proxy_jump: None,
            },
            Err(e) => return Err(e),
        };

        if let Some(user) = hop.user {
            jump.user = user;
        }
        if let Some(port) = hop.port {
            jump.port = port;
        }
        jump.proxy_jump = None;

        Ok(Some(jump))
    }

    fn resolve_in(
        &self,
        hosts: &[SshConfigHost],
        alias: &str,
    ) -> Result<ConnectionParams, SshConfigError> {
        // The implicit global block always matches, so look for a real one
        let known = hosts
            .iter()
            .skip(1)
            .any(|h| h.matches(alias));
        if !known {
            return Err(SshConfigError::UnknownAlias(alias.to_string()));
        }

        let mut merged = SshConfigHost::default();
        for host in hosts.iter().filter(|h| h.matches(alias)) {
            for (key, value) in [
                ("hostname", &host.hostname),
                ("user", &host.user),
                ("port", &host.port),
                ("identityfile", &host.identity_file),
                ("proxyjump", &host.proxy_jump),
            ] {
                if let Some(v) = value {
                    merged.set(key, v);
                }
            }
        }

        let port = match merged.port.as_deref() {
            Some(raw) => raw.parse().map_err(|_| SshConfigError::InvalidValue {
                alias: alias.to_string(),
                key: "Port",
                value: raw.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let proxy_jump = merged
            .proxy_jump
            .filter(|v| !v.eq_ignore_ascii_case("none"));

        Ok(ConnectionParams {
            alias: alias.to_string(),
            hostname: merged.hostname.unwrap_or_else(|| alias.to_string()),
            port,
            user: merged.user.unwrap_or_else(|| self.current_user.clone()),
            identity_file: merged.identity_file.map(|p| self.expand_tilde(&p)),
            proxy_jump,
        })
    }

    fn expand_tilde(&self, path: &str) -> PathBuf {
        match path.strip_prefix("~/") {
            Some(rest) => self.home_dir.join(rest),
            None if path == "~" => self.home_dir.clone(),
            None => PathBuf::from(path),
        }
    }
}
