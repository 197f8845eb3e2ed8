//! Storage usage reporting.

use serde::Serialize;

use crate::Cache;

/// Entry count and body bytes of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionUsage {
    pub name: String,
    pub entries: usize,
    pub bytes: usize,
}

/// Totals across every partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub entries: usize,
    pub bytes: usize,
    pub partitions: Vec<PartitionUsage>,
}

impl CacheUsage {
    pub(crate) fn from_partitions<'a>(caches: impl Iterator<Item = &'a Cache>) -> Self {
        let partitions: Vec<PartitionUsage> = caches
            .map(|cache| PartitionUsage {
                name: cache.name.clone(),
                entries: cache.len(),
                bytes: cache.size_bytes(),
            })
            .collect();

        Self {
            entries: partitions.iter().map(|p| p.entries).sum(),
            bytes: partitions.iter().map(|p| p.bytes).sum(),
            partitions,
        }
    }

    /// One-line summary, e.g. `12 items, 1.5 KB`.
    pub fn summary(&self) -> String {
        format!("{} items, {}", self.entries, format_bytes(self.bytes))
    }
}

/// Format a byte count with binary units (`0 Bytes`, `1.5 KB`, `2 MB`).
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // Two decimals, trailing zeros trimmed.
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
