//! Bridge configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ClientError;

/// Build profile variable; `production` enables registration.
pub const PROFILE_ENV: &str = "SITEKIT_PROFILE";

/// Explicit opt-in outside production builds.
pub const SW_ENABLED_ENV: &str = "SITEKIT_SW_ENABLED";

/// Origin override.
pub const ORIGIN_ENV: &str = "SITEKIT_ORIGIN";

/// Where the router script lives and whether to register it at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the page.
    pub origin: Url,
    /// Router script path.
    pub script_url: String,
    /// Registration scope.
    pub scope: String,
    /// Registration enabled by the build profile.
    pub enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:3000/").expect("static origin URL is valid"),
            script_url: "/sw.js".to_string(),
            scope: "/".to_string(),
            enabled: false,
        }
    }
}

impl ClientConfig {
    /// Configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = Self::default();

        let production = lookup(PROFILE_ENV)
            .map(|profile| profile.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let opted_in = lookup(SW_ENABLED_ENV).as_deref() == Some("true");
        config.enabled = production || opted_in;

        if let Some(origin) = lookup(ORIGIN_ENV) {
            config.origin = Url::parse(&origin)
                .map_err(|e| ClientError::Config(format!("{ORIGIN_ENV}={origin}: {e}")))?;
        }

        Ok(config)
    }

    /// Absolute URL of the router script.
    pub fn script(&self) -> Result<Url, ClientError> {
        self.origin
            .join(&self.script_url)
            .map_err(|e| ClientError::Config(format!("script {:?}: {e}", self.script_url)))
    }
}
