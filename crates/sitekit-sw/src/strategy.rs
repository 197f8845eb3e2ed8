//! Per-class caching strategies.

use std::sync::Arc;

use sitekit_net::{Request, Response};
use tracing::{debug, warn};

use crate::fallback;
use crate::router::RouterInner;
use crate::{RefreshOutcome, RouterEvent, ServiceWorkerError};

/// Cache-first on the image partition, refreshing hits in the background.
pub(crate) async fn image(inner: &Arc<RouterInner>, request: &Request) -> Response {
    let partition = inner.names.images.as_str();

    let cached = match inner.storage.match_in(partition, &request.url).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(url = %request.url, error = %e, "Image cache lookup failed");
            None
        }
    };

    if let Some(cached) = cached {
        spawn_refresh(inner, request.clone());
        return cached;
    }

    match inner.fetch(request).await {
        Ok(response) => {
            if response.ok() {
                inner.store(partition, request, &response).await;
            }
            response
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Image fetch failed");
            fallback::image_unavailable()
        }
    }
}

/// Refetch a cached image without holding up the caller.
fn spawn_refresh(inner: &Arc<RouterInner>, request: Request) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let outcome = match inner.fetch(&request).await {
            Ok(response) if response.ok() => {
                match inner
                    .storage
                    .put(&inner.names.images, &request, &response)
                    .await
                {
                    Ok(()) => RefreshOutcome::Updated,
                    Err(e) => RefreshOutcome::Failed(e.to_string()),
                }
            }
            Ok(response) => RefreshOutcome::Skipped(response.status.as_u16()),
            Err(e) => RefreshOutcome::Failed(e.to_string()),
        };

        match &outcome {
            RefreshOutcome::Updated => debug!(url = %request.url, "Image refreshed"),
            RefreshOutcome::Skipped(status) => {
                debug!(url = %request.url, status, "Image refresh skipped")
            }
            RefreshOutcome::Failed(reason) => {
                warn!(url = %request.url, reason = %reason, "Image refresh failed")
            }
        }

        inner.emit(RouterEvent::BackgroundRefresh {
            url: request.url.to_string(),
            outcome,
        });
    });
}

/// Cache-first on the static partition. When both the network and every
/// partition come up empty the failure is returned to the caller.
pub(crate) async fn static_asset(
    inner: &RouterInner,
    request: &Request,
) -> Result<Response, ServiceWorkerError> {
    let partition = inner.names.static_assets.as_str();

    let failure: ServiceWorkerError = match inner.storage.match_in(partition, &request.url).await {
        Ok(Some(cached)) => return Ok(cached),
        Ok(None) => match inner.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    inner.store(partition, request, &response).await;
                }
                return Ok(response);
            }
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    };

    debug!(url = %request.url, error = %failure, "Static asset unavailable, trying every cache");
    match inner.lookup_any(&request.url).await {
        Some(cached) => Ok(cached),
        None => Err(failure),
    }
}

/// Network first, caching successes in the dynamic partition.
pub(crate) async fn network_first(inner: &RouterInner, request: &Request) -> Response {
    match network_then_store(inner, request).await {
        Some(response) => response,
        None => inner
            .lookup_any(&request.url)
            .await
            .unwrap_or_else(fallback::content_unavailable),
    }
}

/// Network first; offline falls back to the cached page, then the cached
/// root document, then the built-in offline page.
pub(crate) async fn navigation(inner: &RouterInner, request: &Request) -> Response {
    if let Some(response) = network_then_store(inner, request).await {
        return response;
    }

    if let Some(cached) = inner.lookup_any(&request.url).await {
        return cached;
    }

    let root = inner.config.root_url();
    if let Some(cached) = inner.lookup_any(&root).await {
        debug!(url = %request.url, "Serving cached root document offline");
        return cached;
    }

    debug!(url = %request.url, "Serving offline page");
    fallback::offline_page()
}

/// Network first with a generic offline placeholder.
pub(crate) async fn default(inner: &RouterInner, request: &Request) -> Response {
    match network_then_store(inner, request).await {
        Some(response) => response,
        None => inner
            .lookup_any(&request.url)
            .await
            .unwrap_or_else(fallback::not_available),
    }
}

/// Fetch and store 2xx in the dynamic partition. `None` on network failure.
async fn network_then_store(inner: &RouterInner, request: &Request) -> Option<Response> {
    match inner.fetch(request).await {
        Ok(response) => {
            if response.ok() {
                inner.store(&inner.names.dynamic, request, &response).await;
            }
            Some(response)
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Network fetch failed");
            None
        }
    }
}
