//! JSON snapshots of cache storage.
//!
//! Bodies are stored base64-encoded. Writes go to a sibling temp file first
//! and are renamed into place, so a crash never leaves a half-written
//! snapshot behind.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Cache, CacheError};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    partitions: &'a [Cache],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    partitions: Vec<Cache>,
}

pub(crate) fn encode(caches: &[Cache]) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        partitions: caches,
    })
    .map_err(|e| CacheError::Snapshot(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Cache>, CacheError> {
    let snapshot: Snapshot =
        serde_json::from_slice(bytes).map_err(|e| CacheError::Snapshot(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Snapshot(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(snapshot.partitions)
}

pub(crate) async fn write(path: &Path, bytes: Vec<u8>) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| CacheError::Snapshot(format!("{}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::Snapshot(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote cache snapshot");
    Ok(())
}

pub(crate) async fn read(path: &Path) -> Result<Vec<Cache>, CacheError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CacheError::Snapshot(format!("{}: {}", path.display(), e)))?;
    decode(&bytes)
}

/// Serde adapter storing `Bytes` as a base64 string.
pub(crate) mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
