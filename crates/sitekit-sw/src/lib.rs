//! # SiteKit Service Worker
//!
//! The cache strategy router: it sits between a page and the network,
//! classifies each GET request and answers it from the network, from one of
//! the versioned cache partitions, or from a synthetic offline response.
//!
//! ## Features
//!
//! - **Classification**: ordered rule table, first match wins
//! - **Strategies**: image (cache-first + background refresh), static
//!   (cache-first), network-first, navigation (offline fallback chain),
//!   default
//! - **Lifecycle**: install precaches the shell, activate evicts partitions
//!   of earlier versions
//! - **Push**: push payloads become notification options; `background-sync`
//!   registrations are acknowledged
//! - **Events**: state changes, background refreshes, notifications and page
//!   messages on a broadcast channel
//!
//! ## Architecture
//!
//! ```text
//! CacheRouter
//!     ├── RouterConfig ── PartitionNames
//!     ├── Classifier (Vec<Rule>)
//!     ├── CacheStorage (sitekit-cache)
//!     └── Fetcher (sitekit-net)
//!
//! handle_fetch(request)
//!     └── should_intercept? ── classify ── strategy ── Response
//! ```

use serde::{Deserialize, Serialize};
use sitekit_cache::CacheError;
use sitekit_net::NetError;
use thiserror::Error;

pub mod classify;
pub mod config;
pub mod fallback;
mod lifecycle;
pub mod push;
mod router;
mod strategy;

pub use classify::{should_intercept, Classifier, Matcher, RequestClass, Rule};
pub use config::{PartitionNames, RouterConfig};
pub use lifecycle::{ActivationReport, InstallReport};
pub use push::{NotificationOptions, PushPayload};
pub use router::{CacheRouter, FetchOutcome};

// ==================== Errors ====================

/// Errors that can occur in router operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed on {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid push payload: {0}")]
    InvalidPayload(String),
}

impl From<ServiceWorkerError> for sitekit_common::SiteKitError {
    fn from(err: ServiceWorkerError) -> Self {
        match err {
            ServiceWorkerError::Network(net) => net.into(),
            ServiceWorkerError::Cache(cache) => cache.into(),
            ServiceWorkerError::Config(message) => Self::config(message),
            ServiceWorkerError::InvalidPayload(message) => Self::InvalidArgument(message),
            other => Self::lifecycle_with_source("service worker failed", other),
        }
    }
}

// ==================== State ====================

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Script parsed, nothing run yet.
    #[default]
    Parsed,
    /// Install step running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate step running.
    Activating,
    /// Active and answering fetches.
    Activated,
    /// Install failed or replaced.
    Redundant,
}

// ==================== Messages & Events ====================

/// Messages the router posts to its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// A newer router version finished installing.
    #[serde(rename = "SW_UPDATE_AVAILABLE")]
    UpdateAvailable {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl ClientMessage {
    /// Parse a message posted as JSON. Unknown message types are `None`.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Result of a detached image refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh bytes replaced the cached entry.
    Updated,
    /// The origin answered with a non-2xx status; cache left alone.
    Skipped(u16),
    /// Fetch or store failed; cache left alone.
    Failed(String),
}

/// Router events.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// Worker state changed.
    StateChange(ServiceWorkerState),
    /// Message for every controlled page.
    Message(ClientMessage),
    /// Open pages are now controlled by this worker.
    ClientsClaimed,
    /// A background image refresh settled.
    BackgroundRefresh { url: String, outcome: RefreshOutcome },
    /// A push message produced a notification to display.
    Notification(NotificationOptions),
    /// The `background-sync` registration fired.
    BackgroundSync,
}
