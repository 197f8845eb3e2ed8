//! # SiteKit Client
//!
//! Page-side companion of the cache router. Registers the router once per
//! page session, follows its lifecycle and the host's connectivity, and
//! publishes both as a single read-only status.
//!
//! ## Architecture
//!
//! ```text
//! ClientBridge
//!     ├── ClientConfig
//!     ├── ServiceWorkerHost (register / update / unregister / reload)
//!     ├── Fetcher (script preflight)
//!     └── watch::Sender<ClientStatus>
//!
//! BridgeEvent ── transition() ── LifecycleState
//! ```
//!
//! Registration failures never surface as errors to callers; they end up in
//! [`LifecycleState::Error`].

use sitekit_net::NetError;
use thiserror::Error;

mod bridge;
pub mod config;
pub mod connectivity;
pub mod host;
pub mod state;

pub use bridge::ClientBridge;
pub use config::ClientConfig;
pub use connectivity::{ConnectionQuality, Connectivity};
pub use host::{Registration, RegistrationOptions, ServiceWorkerHost, UpdateViaCache};
pub use state::{transition, BridgeEvent, ClientStatus, LifecycleState};

/// Errors reported by the host or the preflight check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Service workers not supported")]
    Unsupported,

    #[error("Service worker file not found ({0})")]
    ScriptNotFound(u16),

    #[error("Preflight failed: {0}")]
    Preflight(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<NetError> for ClientError {
    fn from(err: NetError) -> Self {
        ClientError::Preflight(err.to_string())
    }
}

impl From<ClientError> for sitekit_common::SiteKitError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config(message) => Self::config(message),
            other => Self::registration_with_source("client bridge failed", other),
        }
    }
}
