//! Router configuration.
//!
//! Everything the router consults at runtime is fixed here when the worker
//! starts: partition names, routing tables and the precache list.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Immutable router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Origin the worker is served from; shell assets and the root document
    /// resolve against it.
    pub origin: Url,

    /// Prefix of every partition name.
    pub cache_prefix: String,

    /// Version token embedded in partition names.
    pub version: String,

    /// Shell assets precached on install.
    pub shell_assets: Vec<String>,

    /// Path prefixes served cache-first.
    pub cache_first_prefixes: Vec<String>,

    /// Path prefixes served network-first.
    pub network_first_prefixes: Vec<String>,

    /// Image hosts (subdomains included).
    pub image_hosts: Vec<String>,

    /// Image file extensions, without the dot.
    pub image_extensions: Vec<String>,

    /// Script, style and font extensions, without the dot.
    pub static_extensions: Vec<String>,

    /// Per-fetch time limit in milliseconds; unset waits indefinitely.
    pub fetch_timeout_ms: Option<u64>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:3000/").expect("static origin URL is valid"),
            cache_prefix: "portfolio".to_string(),
            version: "1.0.0".to_string(),
            shell_assets: strings(&[
                "/",
                "/about",
                "/work",
                "/contact",
                "/manifest.json",
                "/_next/static/css/app/layout.css",
                "/_next/static/css/app/globals.css",
            ]),
            cache_first_prefixes: strings(&["/_next/static/", "/fonts/", "/icons/"]),
            network_first_prefixes: strings(&["/api/", "/_next/static/chunks/"]),
            image_hosts: strings(&[
                "ext.same-assets.com",
                "ugc.same-assets.com",
                "images.unsplash.com",
                "source.unsplash.com",
            ]),
            image_extensions: strings(&["jpg", "jpeg", "png", "gif", "webp", "avif", "svg"]),
            static_extensions: strings(&["js", "css", "woff", "woff2", "ttf", "eot"]),
            fetch_timeout_ms: None,
        }
    }
}

impl RouterConfig {
    /// Parse a JSON config; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ServiceWorkerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ServiceWorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ServiceWorkerError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ServiceWorkerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check the configuration for values the router cannot work with.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ServiceWorkerError::Config(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        if self.cache_prefix.trim().is_empty() || self.version.trim().is_empty() {
            return Err(ServiceWorkerError::Config(
                "cache prefix and version must not be empty".to_string(),
            ));
        }
        let prefixes = self
            .cache_first_prefixes
            .iter()
            .chain(&self.network_first_prefixes);
        for prefix in prefixes {
            if !prefix.starts_with('/') {
                return Err(ServiceWorkerError::Config(format!(
                    "path prefix {prefix:?} must start with '/'"
                )));
            }
        }
        for asset in &self.shell_assets {
            self.resolve(asset)?;
        }
        Ok(())
    }

    /// Resolve a site path (or absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::Config(format!("{path:?}: {e}")))
    }

    /// The root document of the site.
    pub fn root_url(&self) -> Url {
        let mut root = self.origin.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        root
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Versioned partition names.
    pub fn partition_names(&self) -> PartitionNames {
        let (prefix, version) = (&self.cache_prefix, &self.version);
        PartitionNames {
            static_assets: format!("{prefix}-static-v{version}"),
            dynamic: format!("{prefix}-dynamic-v{version}"),
            images: format!("{prefix}-images-v{version}"),
            legacy: format!("{prefix}-v{version}"),
        }
    }
}

/// Names of the partitions owned by one router version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    /// Shell assets and cache-first static files.
    pub static_assets: String,
    /// Navigations and network-first content.
    pub dynamic: String,
    /// Image bytes.
    pub images: String,
    /// Umbrella name from older deployments; never written, only kept.
    pub legacy: String,
}

impl PartitionNames {
    /// Every name that survives activation.
    pub fn known(&self) -> [&str; 4] {
        [
            self.static_assets.as_str(),
            self.dynamic.as_str(),
            self.images.as_str(),
            self.legacy.as_str(),
        ]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known().contains(&name)
    }
}
