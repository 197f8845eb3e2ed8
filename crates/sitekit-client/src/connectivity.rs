//! Host connectivity as reported by online/offline and connection events.
//!
//! Purely informational; the router never looks at it.

use serde::{Deserialize, Serialize};

/// Connection quality hints, when the host reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionQuality {
    /// Physical link, e.g. `wifi`, `cellular`, `unknown`.
    pub connection_type: String,
    /// Bandwidth class, e.g. `4g`, `3g`, `slow-2g`.
    pub effective_type: String,
    /// Downlink estimate in Mbps.
    pub downlink_mbps: f64,
    /// Round-trip estimate in milliseconds.
    pub rtt_ms: u32,
}

impl Default for ConnectionQuality {
    fn default() -> Self {
        Self {
            connection_type: "unknown".to_string(),
            effective_type: "4g".to_string(),
            downlink_mbps: 0.0,
            rtt_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    pub online: bool,
    pub quality: Option<ConnectionQuality>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            online: true,
            quality: None,
        }
    }
}

impl Connectivity {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            quality: None,
        }
    }

    /// One-line status, e.g. `Online (4G) 10.0 Mbps • 50ms`.
    pub fn summary(&self) -> String {
        if !self.online {
            return "Offline".to_string();
        }

        let mut line = "Online".to_string();
        if let Some(quality) = &self.quality {
            line.push_str(&format!(" ({})", quality.effective_type.to_uppercase()));
            if quality.downlink_mbps > 0.0 {
                line.push_str(&format!(
                    " {:.1} Mbps • {}ms",
                    quality.downlink_mbps, quality.rtt_ms
                ));
            }
        }
        line
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}
