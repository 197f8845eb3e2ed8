//! # SiteKit Cache
//!
//! Named response caches ("partitions") shared by every consumer of one
//! [`CacheStorage`] handle.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage (shared handle, clone freely)
//!     └── Cache "<prefix>-static-v1.0.0"
//!             └── GET url → CacheEntry (status, headers, body)
//! ```
//!
//! Partitions are created on first write and listed in creation order, which
//! is also the order of wildcard lookups. Every put and delete is atomic;
//! concurrent writers to the same key race and the last write wins.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use sitekit_net::{Request, Response, ResponseSource};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};
use url::Url;

mod snapshot;
pub mod usage;

pub use usage::{format_bytes, CacheUsage, PartitionUsage};

// ==================== Errors ====================

/// Errors that can occur in cache storage operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Only GET requests can be cached, got {0}")]
    MethodNotAllowed(String),

    #[error("Cache quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Corrupted cache entry for {url}: {reason}")]
    Corrupted { url: String, reason: String },

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<CacheError> for sitekit_common::SiteKitError {
    fn from(err: CacheError) -> Self {
        Self::cache_with_source("cache storage failed", err)
    }
}

/// Normalized cache key for a URL (fragment dropped).
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method (always GET).
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    #[serde(with = "snapshot::base64_body")]
    pub body: Bytes,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response for storage under `url`.
    pub fn from_response(url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: cache_key(url),
            method: Method::GET.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild the stored response.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let corrupted = |reason: String| CacheError::Corrupted {
            url: self.url.clone(),
            reason,
        };

        let status = StatusCode::from_u16(self.status).map_err(|e| corrupted(e.to_string()))?;
        let url = Url::parse(&self.url).map_err(|e| corrupted(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupted(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| corrupted(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Response {
            url: Some(url),
            status,
            headers,
            body: self.body.clone(),
            source: ResponseSource::Cache,
        })
    }

    /// Body size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

// ==================== Cache ====================

/// A single named partition.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries keyed by normalized URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a normalized URL.
    pub fn match_url(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or replace an entry, returning the replaced one.
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.url.clone(), entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total body bytes held.
    pub fn size_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::size).sum()
    }
}

// ==================== Cache Storage ====================

#[derive(Debug, Default)]
struct StorageInner {
    /// Partitions in creation order.
    caches: Vec<Cache>,
    quota: Option<usize>,
}

impl StorageInner {
    fn find(&self, name: &str) -> Option<&Cache> {
        self.caches.iter().find(|c| c.name == name)
    }

    fn total_bytes(&self) -> usize {
        self.caches.iter().map(Cache::size_bytes).sum()
    }
}

/// Shared handle to every cache partition of one origin.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    inner: Arc<RwLock<StorageInner>>,
}

impl CacheStorage {
    /// Create new, empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that refuses writes past `bytes` of total body data.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StorageInner {
                caches: Vec::new(),
                quota: Some(bytes),
            })),
        }
    }

    /// Check if a partition exists.
    pub async fn has(&self, name: &str) -> bool {
        self.inner.read().await.find(name).is_some()
    }

    /// All partition names, in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .caches
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Delete a whole partition.
    pub async fn delete(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.caches.len();
        inner.caches.retain(|c| c.name != name);
        let deleted = inner.caches.len() != before;
        if deleted {
            debug!(partition = name, "Deleted cache partition");
        }
        deleted
    }

    /// Delete every partition. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.write().await;
        let count = inner.caches.len();
        inner.caches.clear();
        info!(count, "Cleared all cache partitions");
        count
    }

    /// Look up `url` in one partition. A missing partition is a miss.
    pub async fn match_in(&self, name: &str, url: &Url) -> Result<Option<Response>, CacheError> {
        let key = cache_key(url);
        let inner = self.inner.read().await;
        let entry = inner.find(name).and_then(|cache| cache.match_url(&key));
        trace!(partition = name, url = %key, hit = entry.is_some(), "Cache lookup");
        entry.map(CacheEntry::to_response).transpose()
    }

    /// Look up `url` across all partitions, oldest partition first.
    pub async fn match_any(&self, url: &Url) -> Result<Option<Response>, CacheError> {
        let key = cache_key(url);
        let inner = self.inner.read().await;
        let entry = inner.caches.iter().find_map(|cache| cache.match_url(&key));
        trace!(url = %key, hit = entry.is_some(), "Wildcard cache lookup");
        entry.map(CacheEntry::to_response).transpose()
    }

    /// Store `response` for `request` in partition `name`, creating the
    /// partition if needed.
    pub async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        self.put_all(name, [(request, response)]).await
    }

    /// Store several responses in partition `name` at once.
    ///
    /// Either every entry is written or none is: the method and quota checks
    /// run for the whole batch before anything is inserted, so entries that
    /// were already present survive a rejected batch untouched.
    pub async fn put_all<'a, I>(&self, name: &str, pairs: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (&'a Request, &'a Response)>,
    {
        let mut entries: Vec<CacheEntry> = Vec::new();
        for (request, response) in pairs {
            if request.method != Method::GET {
                return Err(CacheError::MethodNotAllowed(request.method.to_string()));
            }
            let entry = CacheEntry::from_response(&request.url, response);
            // Later duplicates replace earlier ones within the batch.
            entries.retain(|e| e.url != entry.url);
            entries.push(entry);
        }

        let mut inner = self.inner.write().await;

        if let Some(quota) = inner.quota {
            let existing = inner.find(name);
            let replaced: usize = entries
                .iter()
                .filter_map(|entry| existing.and_then(|cache| cache.match_url(&entry.url)))
                .map(CacheEntry::size)
                .sum();
            let needed: usize = entries.iter().map(CacheEntry::size).sum();
            let used = inner.total_bytes() - replaced;
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(CacheError::QuotaExceeded { needed, available });
            }
        }

        if entries.is_empty() {
            return Ok(());
        }

        let index = match inner.caches.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                debug!(partition = name, "Creating cache partition");
                inner.caches.push(Cache::new(name));
                inner.caches.len() - 1
            }
        };

        for entry in entries {
            trace!(partition = name, url = %entry.url, bytes = entry.size(), "Cache put");
            inner.caches[index].put(entry);
        }
        Ok(())
    }

    /// Number of entries in a partition, `None` if it does not exist.
    pub async fn partition_len(&self, name: &str) -> Option<usize> {
        self.inner.read().await.find(name).map(Cache::len)
    }

    /// Entry counts and byte totals per partition.
    pub async fn usage(&self) -> CacheUsage {
        let inner = self.inner.read().await;
        CacheUsage::from_partitions(inner.caches.iter())
    }

    /// Write every partition to `path` as JSON.
    pub async fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = {
            let inner = self.inner.read().await;
            snapshot::encode(&inner.caches)?
        };
        snapshot::write(path, json).await
    }

    /// Load storage from a snapshot written by [`CacheStorage::save`].
    pub async fn load(path: &Path) -> Result<Self, CacheError> {
        Self::load_with_quota(path, None).await
    }

    /// Load a snapshot and enforce `quota` on later writes.
    ///
    /// A snapshot already larger than the quota loads as-is; only new
    /// writes are refused until enough is deleted.
    pub async fn load_with_quota(path: &Path, quota: Option<usize>) -> Result<Self, CacheError> {
        let caches = snapshot::read(path).await?;
        info!(
            path = %path.display(),
            partitions = caches.len(),
            quota = ?quota,
            "Loaded cache snapshot"
        );
        Ok(Self {
            inner: Arc::new(RwLock::new(StorageInner { caches, quota })),
        })
    }
}
