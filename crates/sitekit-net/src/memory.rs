//! In-memory fetcher with scripted routes.
//!
//! Serves fixed responses per URL and can be switched offline, which makes it
//! the stand-in origin for router and bridge tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use tracing::trace;

use crate::{Fetcher, NetError, Request, Response};

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: StatusCode,
        content_type: HeaderValue,
        body: Bytes,
    },
    Fail(String),
    Hang,
}

/// Scripted origin keyed by absolute URL (fragment ignored).
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    routes: RwLock<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: Mutex<HashMap<String, usize>>,
}

fn route_key(url: &str) -> &str {
    url.split_once('#').map(|(base, _)| base).unwrap_or(url)
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with the given status and content type.
    pub fn route(&self, url: &str, status: u16, content_type: &str, body: impl Into<Bytes>) {
        let route = Route::Respond {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            content_type: HeaderValue::from_str(content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            body: body.into(),
        };
        self.set_route(url, route);
    }

    /// Serve a 200 `text/plain` body.
    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.route(url, 200, "text/plain", body);
    }

    /// Fail every fetch of `url` with a transport error.
    pub fn fail(&self, url: &str, message: &str) {
        self.set_route(url, Route::Fail(message.to_string()));
    }

    /// Never settle fetches of `url`.
    pub fn hang(&self, url: &str) {
        self.set_route(url, Route::Hang);
    }

    /// Drop the route for `url`; later fetches get a 404.
    pub fn remove(&self, url: &str) {
        if let Ok(mut routes) = self.routes.write() {
            routes.remove(route_key(url));
        }
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of fetches issued for `url`, offline attempts included.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(route_key(url)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of fetches issued for any URL.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    fn set_route(&self, url: &str, route: Route) {
        if let Ok(mut routes) = self.routes.write() {
            routes.insert(route_key(url).to_string(), route);
        }
    }

    fn lookup(&self, key: &str) -> Option<Route> {
        self.routes.read().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = route_key(request.url.as_str()).to_string();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.clone()).or_insert(0) += 1;
        }
        trace!(url = %request.url, method = %request.method, "Memory fetch");

        if self.is_offline() {
            return Err(NetError::Offline(key));
        }

        match self.lookup(&key) {
            Some(Route::Respond {
                status,
                content_type,
                body,
            }) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, content_type);
                let body = if request.method == Method::HEAD {
                    Bytes::new()
                } else {
                    body
                };
                Ok(Response::new(request.url.clone(), status, headers, body))
            }
            Some(Route::Fail(message)) => Err(NetError::RequestFailed(message)),
            Some(Route::Hang) => std::future::pending().await,
            None => Ok(Response::new(
                request.url.clone(),
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Bytes::from_static(b"Not Found"),
            )),
        }
    }
}
