//! Top-level dispatcher.

use std::sync::Arc;

use sitekit_cache::CacheStorage;
use sitekit_net::{Fetcher, NetError, Request, Response};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};
use url::Url;

use crate::classify::{should_intercept, Classifier, RequestClass};
use crate::config::{PartitionNames, RouterConfig};
use crate::{strategy, RouterEvent, ServiceWorkerError, ServiceWorkerState};

const EVENT_CAPACITY: usize = 64;

/// What the router did with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not handled; the request goes to the network untouched.
    PassThrough,
    /// Answered by a strategy.
    Respond {
        class: RequestClass,
        response: Response,
    },
}

impl FetchOutcome {
    /// The response, if the router answered.
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond { response, .. } => Some(response),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond { response, .. } => Some(response),
        }
    }
}

pub(crate) struct RouterInner {
    pub(crate) config: RouterConfig,
    pub(crate) names: PartitionNames,
    pub(crate) classifier: Classifier,
    pub(crate) storage: CacheStorage,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) state: watch::Sender<ServiceWorkerState>,
    pub(crate) events: broadcast::Sender<RouterEvent>,
}

impl RouterInner {
    /// Fetch through the configured fetcher, honoring the optional time limit.
    pub(crate) async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let limit = self.config.fetch_timeout();
        match sitekit_common::with_timeout(limit, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout(limit.unwrap_or_default())),
        }
    }

    /// Store a response; storage failures are logged and otherwise ignored.
    pub(crate) async fn store(&self, partition: &str, request: &Request, response: &Response) {
        if let Err(e) = self.storage.put(partition, request, response).await {
            warn!(partition, url = %request.url, error = %e, "Failed to cache response");
        }
    }

    /// Look up a URL in every partition; storage failures count as misses.
    pub(crate) async fn lookup_any(&self, url: &Url) -> Option<Response> {
        match self.storage.match_any(url).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    pub(crate) fn set_state(&self, state: ServiceWorkerState) {
        self.state.send_replace(state);
        debug!(?state, "Worker state changed");
        self.emit(RouterEvent::StateChange(state));
    }

    pub(crate) fn emit(&self, event: RouterEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// The cache strategy router. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct CacheRouter {
    pub(crate) inner: Arc<RouterInner>,
}

impl CacheRouter {
    /// Create a router over `storage`, fetching through `fetcher`.
    pub fn new(
        config: RouterConfig,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        config.validate()?;
        let names = config.partition_names();
        let classifier = Classifier::from_config(&config);
        let (state, _) = watch::channel(ServiceWorkerState::Parsed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        debug!(version = %config.version, origin = %config.origin, "Router created");

        Ok(Self {
            inner: Arc::new(RouterInner {
                config,
                names,
                classifier,
                storage,
                fetcher,
                state,
                events,
            }),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn partitions(&self) -> &PartitionNames {
        &self.inner.names
    }

    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    /// Current worker state.
    pub fn state(&self) -> ServiceWorkerState {
        *self.inner.state.borrow()
    }

    /// Follow worker state changes.
    pub fn watch_state(&self) -> watch::Receiver<ServiceWorkerState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to router events.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.inner.events.subscribe()
    }

    /// Handle one outgoing request.
    ///
    /// Non-GET and non-http(s) requests, and every request before the worker
    /// is activated, pass through. An error is returned only when the
    /// static-asset strategy has nothing at all to answer with.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, ServiceWorkerError> {
        if !should_intercept(request) {
            trace!(url = %request.url, method = %request.method, "Not intercepted");
            return Ok(FetchOutcome::PassThrough);
        }

        let state = self.state();
        if state != ServiceWorkerState::Activated {
            trace!(url = %request.url, ?state, "Worker not active, passing through");
            return Ok(FetchOutcome::PassThrough);
        }

        let class = self.inner.classifier.classify(request);
        debug!(url = %request.url, class = %class, "Routing request");

        let response = match class {
            RequestClass::Image => strategy::image(&self.inner, request).await,
            RequestClass::StaticAsset => strategy::static_asset(&self.inner, request).await?,
            RequestClass::NetworkFirst => strategy::network_first(&self.inner, request).await,
            RequestClass::Navigation => strategy::navigation(&self.inner, request).await,
            RequestClass::Default => strategy::default(&self.inner, request).await,
        };

        trace!(
            url = %request.url,
            status = %response.status,
            source = ?response.source,
            "Routed response"
        );
        Ok(FetchOutcome::Respond { class, response })
    }
}
