//! SSH module - handles SSH connections and sessions
//!
//! This module provides the core SSH functionality using russh library.
//!
//! # Features
//! - Direct SSH connections
//! - One-hop ProxyJump through a `direct-tcpip` tunnel
//! - Identity file, SSH agent and password authentication
//! - Channel-based password prompts with a 60s timeout

mod agent;
pub mod auth;
mod client;
pub mod connect;
mod error;
pub mod prompt;
mod session;

pub use agent::SshAgentClient;
pub use auth::{
    build_methods, load_identity, AuthAttempt, AuthEnvironment, AuthError, AuthMethod, AuthState,
    PasswordPrompt,
};
pub use client::{ClientHandler, RusshDialer, RusshTransport};
pub use connect::{Connector, Dialer, Endpoint, Transport};
pub use error::{ConnectError, SshError};
pub use prompt::{PasswordRequest, PromptBroker, PROMPT_TIMEOUT};
pub use session::Session;
