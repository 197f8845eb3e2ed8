//! The page host: whatever owns service worker registrations and the page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connectivity::Connectivity;
use crate::ClientError;

/// When the host may answer update checks from its HTTP cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateViaCache {
    Imports,
    All,
    /// Always revalidate the script.
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationOptions {
    pub scope: String,
    pub update_via_cache: UpdateViaCache,
}

/// A live registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub script_url: Url,
    pub scope: Url,
}

/// Host capabilities the bridge drives.
#[async_trait]
pub trait ServiceWorkerHost: Send + Sync {
    /// Whether the host can run service workers at all.
    fn is_supported(&self) -> bool;

    /// Whether a worker already controls the page.
    fn has_controller(&self) -> bool;

    /// Connectivity at startup.
    fn connectivity(&self) -> Connectivity {
        Connectivity::default()
    }

    async fn register(
        &self,
        script_url: &Url,
        options: &RegistrationOptions,
    ) -> Result<Registration, ClientError>;

    /// Check for and apply a newer router script.
    async fn update(&self, registration: &Registration) -> Result<(), ClientError>;

    async fn unregister(&self, registration: &Registration) -> Result<bool, ClientError>;

    /// Reload the page.
    async fn reload(&self);
}
