//! Push messages and background sync.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::router::CacheRouter;
use crate::{RouterEvent, ServiceWorkerError};

/// Tag of the only sync registration the router acts on.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

pub const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";
pub const NOTIFICATION_BADGE: &str = "/icons/badge-72x72.png";
pub const NOTIFICATION_VIBRATE: [u32; 3] = [100, 50, 100];

/// JSON body of a push message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub primary_key: Option<serde_json::Value>,
}

/// Extra data attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Arrival time, ms since epoch.
    pub date_of_arrival: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<serde_json::Value>,
}

/// A notification ready for the host to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationOptions {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
}

impl NotificationOptions {
    pub fn from_payload(payload: PushPayload, date_of_arrival: u64) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibrate: NOTIFICATION_VIBRATE.to_vec(),
            data: NotificationData {
                date_of_arrival,
                primary_key: payload.primary_key,
            },
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl CacheRouter {
    /// Turn a push message into a notification.
    ///
    /// A push without data shows nothing. The notification is also emitted
    /// as [`RouterEvent::Notification`].
    pub fn push(&self, data: Option<&str>) -> Result<Option<NotificationOptions>, ServiceWorkerError> {
        let Some(data) = data else {
            debug!("Push without data ignored");
            return Ok(None);
        };

        let payload: PushPayload = serde_json::from_str(data)
            .map_err(|e| ServiceWorkerError::InvalidPayload(e.to_string()))?;
        let notification = NotificationOptions::from_payload(payload, now_millis());

        info!(title = %notification.title, "Showing push notification");
        self.inner.emit(RouterEvent::Notification(notification.clone()));
        Ok(Some(notification))
    }

    /// Handle a sync registration firing. Returns whether the tag was
    /// recognized.
    pub fn sync(&self, tag: &str) -> bool {
        if tag != BACKGROUND_SYNC_TAG {
            debug!(tag, "Ignoring sync event");
            return false;
        }

        info!("Performing background sync");
        self.inner.emit(RouterEvent::BackgroundSync);
        true
    }
}
