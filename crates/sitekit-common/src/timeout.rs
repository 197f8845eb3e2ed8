//! Timeout utilities.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Run an operation with an optional timeout.
///
/// `None` waits for the operation however long it takes, leaving any limit
/// to the underlying transport.
pub async fn with_timeout<T, Fut>(timeout: Option<Duration>, operation: Fut) -> crate::Result<T>
where
    Fut: Future<Output = T>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, operation).await.map_err(|_| {
            debug!(?limit, "Operation exceeded its time limit");
            crate::SiteKitError::Timeout(limit)
        }),
        None => Ok(operation.await),
    }
}
