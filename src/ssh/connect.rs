//! Connection Establisher
//!
//! Turns an alias into a live [`Session`]:
//!
//! ```text
//! resolve ─┬─ direct ──────────────────────────── handshake(target) ─┬─ open SFTP
//!          └─ ProxyJump: handshake(proxy) ─▶ tunnel ─▶ handshake(target) ┘
//! ```
//!
//! Every handshake gets one password retry (see [`AuthAttempt`]). The proxy
//! is dialed with the target's key-based methods.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::auth::{build_methods, AuthAttempt, AuthEnvironment, AuthMethod, AuthState, PasswordPrompt};
use super::error::{ConnectError, SshError};
use super::session::Session;
use crate::config::{ConnectionParams, SshConfigResolver};
use crate::sftp::{RemoteFs, SftpError};

/// Network identity of one hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub alias: String,
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Endpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ConnectionParams> for Endpoint {
    fn from(params: &ConnectionParams) -> Self {
        Self {
            alias: params.alias.clone(),
            host: params.hostname.clone(),
            port: params.port,
            user: params.user.clone(),
        }
    }
}

/// An authenticated SSH connection.
#[async_trait]
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Tunnel to `target` through this connection and authenticate there.
    async fn dial_through(
        &self,
        target: &Endpoint,
        methods: &[AuthMethod],
    ) -> Result<Box<dyn Transport>, SshError>;

    async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SftpError>;

    async fn close(&self) -> Result<(), SshError>;
}

/// Opens direct TCP connections and authenticates them.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        target: &Endpoint,
        methods: &[AuthMethod],
    ) -> Result<Box<dyn Transport>, SshError>;
}

#[derive(Clone, Copy)]
enum Hop<'a> {
    Direct,
    Through(&'a dyn Transport),
}

pub struct Connector {
    resolver: SshConfigResolver,
    auth_env: AuthEnvironment,
    dialer: Arc<dyn Dialer>,
    prompt: Arc<dyn PasswordPrompt>,
}

impl Connector {
    pub fn new(
        resolver: SshConfigResolver,
        auth_env: AuthEnvironment,
        dialer: Arc<dyn Dialer>,
        prompt: Arc<dyn PasswordPrompt>,
    ) -> Self {
        Self {
            resolver,
            auth_env,
            dialer,
            prompt,
        }
    }

    pub fn resolver(&self) -> &SshConfigResolver {
        &self.resolver
    }

    pub async fn connect(&self, alias: &str) -> Result<Session, ConnectError> {
        let params = self.resolver.resolve(alias).await?;
        let jump = self.resolver.resolve_jump(&params).await?;

        let key_methods = match build_methods(&params, &self.auth_env).await {
            Ok(methods) => Some(methods),
            Err(e) if e.allows_password_fallback() => {
                warn!("No key-based credentials for {}: {}", alias, e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let target = Endpoint::from(&params);

        let (proxy, transport) = match jump {
            None => {
                info!("Connecting to {} ({})", alias, target.address());
                let transport = self.handshake(&key_methods, &target, Hop::Direct).await?;
                (None, transport)
            }
            Some(jump_params) => {
                let proxy_endpoint = Endpoint::from(&jump_params);
                info!(
                    "Connecting to {} ({}) via {} ({})",
                    alias,
                    target.address(),
                    proxy_endpoint.alias,
                    proxy_endpoint.address()
                );

                let proxy = self
                    .handshake(&key_methods, &proxy_endpoint, Hop::Direct)
                    .await?;

                match self
                    .handshake(&key_methods, &target, Hop::Through(proxy.as_ref()))
                    .await
                {
                    Ok(transport) => (Some(proxy), transport),
                    Err(e) => {
                        close_quietly(proxy.as_ref()).await;
                        return Err(e);
                    }
                }
            }
        };

        let sftp = match transport.open_sftp().await {
            Ok(sftp) => sftp,
            Err(e) => {
                close_quietly(transport.as_ref()).await;
                if let Some(proxy) = &proxy {
                    close_quietly(proxy.as_ref()).await;
                }
                return Err(ConnectError::Sftp(e));
            }
        };

        info!("Connected to {}", alias);
        Ok(Session::new(params, transport, proxy, sftp))
    }

    /// Authenticate one hop, with the single password retry.
    async fn handshake(
        &self,
        key_methods: &Option<Vec<AuthMethod>>,
        endpoint: &Endpoint,
        hop: Hop<'_>,
    ) -> Result<Box<dyn Transport>, ConnectError> {
        let mut attempt = match key_methods {
            Some(methods) => AuthAttempt::new(methods.clone()),
            None => AuthAttempt::password_only(),
        };
        let mut last_error = None;

        loop {
            match attempt.state() {
                AuthState::TryKeyBased | AuthState::RetryWithPassword => {
                    let result = match hop {
                        Hop::Direct => self.dialer.dial(endpoint, attempt.methods()).await,
                        Hop::Through(proxy) => {
                            proxy.dial_through(endpoint, attempt.methods()).await
                        }
                    };

                    match result {
                        Ok(transport) => {
                            attempt.succeeded();
                            return Ok(transport);
                        }
                        Err(e) => {
                            warn!("Handshake with {} failed: {}", endpoint.address(), e);
                            last_error = Some(e);
                            attempt.handshake_failed();
                        }
                    }
                }
                AuthState::AwaitingPassword => {
                    let password = self
                        .prompt
                        .prompt_password(&endpoint.alias, &endpoint.host)
                        .await;
                    if attempt.supply_password(password) == AuthState::Failed {
                        return Err(ConnectError::Cancelled);
                    }
                }
                AuthState::Failed | AuthState::Authenticated => break,
            }
        }

        Err(ConnectError::Dial {
            host: endpoint.address(),
            source: last_error
                .unwrap_or_else(|| SshError::AuthenticationFailed("no methods".to_string())),
        })
    }
}

async fn close_quietly(transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        warn!("Failed to close {}: {}", transport.endpoint().address(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::testing::MemoryRemoteFs;
    use crate::ssh::auth::tests::TEST_ED25519_KEY;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Event log shared by the fake dialer and its transports
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        /// Scripted outcomes per dial, true = success; default success
        outcomes: Mutex<VecDeque<bool>>,
        fail_sftp: bool,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().push(event);
        }

        fn next_outcome(&self) -> bool {
            self.outcomes.lock().pop_front().unwrap_or(true)
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    fn describe(methods: &[AuthMethod]) -> String {
        methods.iter().map(AuthMethod::kind).collect::<Vec<_>>().join("+")
    }

    struct FakeDialer(Arc<Recorder>);

    #[async_trait]
    impl Dialer for FakeDialer {
        async fn dial(
            &self,
            target: &Endpoint,
            methods: &[AuthMethod],
        ) -> Result<Box<dyn Transport>, SshError> {
            self.0
                .push(format!("dial {} {} [{}]", target.address(), target.user, describe(methods)));
            if self.0.next_outcome() {
                self.0.push(format!("auth {}", target.host));
                Ok(Box::new(FakeTransport {
                    endpoint: target.clone(),
                    recorder: self.0.clone(),
                }))
            } else {
                Err(SshError::AuthenticationFailed("rejected".to_string()))
            }
        }
    }

    struct FakeTransport {
        endpoint: Endpoint,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }

        async fn dial_through(
            &self,
            target: &Endpoint,
            methods: &[AuthMethod],
        ) -> Result<Box<dyn Transport>, SshError> {
            self.recorder.push(format!(
                "tunnel {} -> {} [{}]",
                self.endpoint.host,
                target.address(),
                describe(methods)
            ));
            if self.recorder.next_outcome() {
                self.recorder.push(format!("auth {}", target.host));
                Ok(Box::new(FakeTransport {
                    endpoint: target.clone(),
                    recorder: self.recorder.clone(),
                }))
            } else {
                Err(SshError::AuthenticationFailed("rejected".to_string()))
            }
        }

        async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SftpError> {
            if self.recorder.fail_sftp {
                return Err(SftpError::SubsystemNotAvailable("disabled".to_string()));
            }
            Ok(Arc::new(MemoryRemoteFs::new()))
        }

        async fn close(&self) -> Result<(), SshError> {
            self.recorder.push(format!("close {}", self.endpoint.host));
            Ok(())
        }
    }

    struct ScriptedPrompt {
        answer: String,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PasswordPrompt for ScriptedPrompt {
        async fn prompt_password(&self, alias: &str, hostname: &str) -> String {
            self.asked.lock().push(format!("{}@{}", alias, hostname));
            self.answer.clone()
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        connector: Connector,
        recorder: Arc<Recorder>,
        prompt: Arc<ScriptedPrompt>,
    }

    fn fixture(config: &str, recorder: Recorder, answer: &str) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let ssh_dir = temp.path().join(".ssh");
        std::fs::create_dir_all(&ssh_dir).unwrap();
        std::fs::write(ssh_dir.join("id_ed25519"), TEST_ED25519_KEY).unwrap();
        std::fs::write(ssh_dir.join("config"), config).unwrap();

        let resolver =
            SshConfigResolver::new(ssh_dir.join("config"), temp.path().to_path_buf(), "alice");
        let env = AuthEnvironment {
            agent_socket: Some(PathBuf::from("/nonexistent/agent.sock")),
        };
        let recorder = Arc::new(recorder);
        let prompt = Arc::new(ScriptedPrompt {
            answer: answer.to_string(),
            asked: Mutex::new(Vec::new()),
        });
        let connector = Connector::new(
            resolver,
            env,
            Arc::new(FakeDialer(recorder.clone())),
            prompt.clone(),
        );

        Fixture {
            _temp: temp,
            connector,
            recorder,
            prompt,
        }
    }

    const CONFIG: &str = r#"
Host build01
    HostName 10.0.0.5
    IdentityFile ~/.ssh/id_ed25519

Host hpc
    HostName login.hpc.internal
    User zhang
    IdentityFile ~/.ssh/id_ed25519
    ProxyJump bastion

Host bastion
    HostName jump.example.org
    User jumper

Host agentonly
    HostName 10.0.0.9
"#;

    #[tokio::test]
    async fn test_direct_connect_uses_identity_only() {
        let f = fixture(CONFIG, Recorder::default(), "");

        let session = f.connector.connect("build01").await.unwrap();
        assert_eq!(session.alias(), "build01");
        assert!(!session.is_tunneled());

        assert_eq!(
            f.recorder.events(),
            vec!["dial 10.0.0.5:22 alice [publickey]", "auth 10.0.0.5"]
        );
        assert!(f.prompt.asked.lock().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_authenticated_before_target() {
        let f = fixture(CONFIG, Recorder::default(), "");

        let session = f.connector.connect("hpc").await.unwrap();
        assert!(session.is_tunneled());

        let events = f.recorder.events();
        let proxy_auth = events.iter().position(|e| e == "auth jump.example.org").unwrap();
        let target_dial = events
            .iter()
            .position(|e| e.contains("login.hpc.internal"))
            .unwrap();
        assert!(proxy_auth < target_dial);

        // Proxy dialed with the target's key and its own user
        assert_eq!(events[0], "dial jump.example.org:22 jumper [publickey]");
        assert_eq!(
            events[2],
            "tunnel jump.example.org -> login.hpc.internal:22 [publickey]"
        );
    }

    #[tokio::test]
    async fn test_password_retry_once_then_success() {
        let recorder = Recorder {
            outcomes: Mutex::new(VecDeque::from([false, true])),
            ..Default::default()
        };
        let f = fixture(CONFIG, recorder, "hunter2");

        f.connector.connect("build01").await.unwrap();

        assert_eq!(
            f.recorder.events(),
            vec![
                "dial 10.0.0.5:22 alice [publickey]",
                "dial 10.0.0.5:22 alice [publickey+password]",
                "auth 10.0.0.5",
            ]
        );
        assert_eq!(*f.prompt.asked.lock(), vec!["build01@10.0.0.5"]);
    }

    #[tokio::test]
    async fn test_second_failure_is_dial_error() {
        let recorder = Recorder {
            outcomes: Mutex::new(VecDeque::from([false, false, true])),
            ..Default::default()
        };
        let f = fixture(CONFIG, recorder, "wrong");

        let err = f.connector.connect("build01").await.unwrap_err();
        assert!(matches!(err, ConnectError::Dial { .. }));
        // No third attempt
        assert_eq!(f.recorder.events().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_password_cancels() {
        let recorder = Recorder {
            outcomes: Mutex::new(VecDeque::from([false])),
            ..Default::default()
        };
        let f = fixture(CONFIG, recorder, "");

        let err = f.connector.connect("build01").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(f.recorder.events().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_agent_goes_to_password() {
        let f = fixture(CONFIG, Recorder::default(), "pw");

        f.connector.connect("agentonly").await.unwrap();
        assert_eq!(
            f.recorder.events(),
            vec!["dial 10.0.0.9:22 alice [password]", "auth 10.0.0.9"]
        );
    }

    #[tokio::test]
    async fn test_target_failure_closes_proxy() {
        let recorder = Recorder {
            // proxy ok, target fails, password retry fails
            outcomes: Mutex::new(VecDeque::from([true, false, false])),
            ..Default::default()
        };
        let f = fixture(CONFIG, recorder, "pw");

        assert!(f.connector.connect("hpc").await.is_err());
        assert_eq!(
            f.recorder.events().last().map(String::as_str),
            Some("close jump.example.org")
        );
    }

    #[tokio::test]
    async fn test_sftp_failure_closes_transport() {
        let recorder = Recorder {
            fail_sftp: true,
            ..Default::default()
        };
        let f = fixture(CONFIG, recorder, "");

        let err = f.connector.connect("build01").await.unwrap_err();
        assert!(matches!(err, ConnectError::Sftp(_)));
        assert_eq!(
            f.recorder.events().last().map(String::as_str),
            Some("close 10.0.0.5")
        );
    }

    #[tokio::test]
    async fn test_unknown_alias_is_config_error() {
        let f = fixture(CONFIG, Recorder::default(), "");
        let err = f.connector.connect("nope").await.unwrap_err();
        assert!(matches!(err, ConnectError::Config(_)));
        assert!(f.recorder.events().is_empty());
    }
}
