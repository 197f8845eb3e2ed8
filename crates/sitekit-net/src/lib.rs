//! # SiteKit Net
//!
//! Request and response types plus the network seam used by the SiteKit
//! offline layer.
//!
//! ## Design Goals
//!
//! 1. **Fetch-shaped types**: requests carry method, destination, mode and
//!    cache mode the way a browser reports them
//! 2. **Cloneable responses**: bodies are `Bytes`, so a response can be
//!    returned and stored at the same time
//! 3. **Pluggable transport**: everything fetches through [`Fetcher`]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};
pub use url::Url;

pub mod memory;

pub use memory::MemoryFetcher;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for sitekit_common::SiteKitError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Timeout(limit) => Self::Timeout(limit),
            other => Self::network_with_source("fetch failed", other),
        }
    }
}

/// Resource type the requester reported for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// No destination (`fetch()`, XHR).
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    Worker,
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full-page document navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// How transport-level HTTP caches may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Revalidate with the origin before using any stored copy.
    NoCache,
    /// Bypass HTTP caches entirely.
    NoStore,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub mode: RequestMode,
    pub cache: CacheMode,
}

impl Request {
    fn with_method(url: Url, method: Method) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            cache: CacheMode::Default,
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::with_method(url, Method::GET)
    }

    /// Create a HEAD request.
    pub fn head(url: Url) -> Self {
        Self::with_method(url, Method::HEAD)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        let mut request = Self::with_method(url, Method::POST);
        request.body = Some(body);
        request
    }

    /// Create a document navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url)
            .destination(Destination::Document)
            .mode(RequestMode::Navigate)
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the reported destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the cache mode.
    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Whether the URL uses an http(s) scheme.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Built locally (offline placeholders).
    Synthetic,
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL, `None` for synthetic responses.
    pub url: Option<Url>,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// Create a network response.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url: Some(url),
            status,
            headers,
            body,
            source: ResponseSource::Network,
        }
    }

    /// Synthetic `text/plain` response.
    pub fn plain_text(status: StatusCode, body: &str) -> Self {
        Self::synthetic(status, "text/plain; charset=utf-8", body)
    }

    /// Synthetic `text/html` response.
    pub fn html(status: StatusCode, body: &str) -> Self {
        Self::synthetic(status, "text/html; charset=utf-8", body)
    }

    fn synthetic(status: StatusCode, content_type: &'static str, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            url: None,
            status,
            headers,
            body: Bytes::copy_from_slice(body.as_bytes()),
            source: ResponseSource::Synthetic,
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Content-Type header value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// The network seam: anything that can turn a request into a response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request. Non-2xx responses are `Ok`; only transport
    /// failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Per-request timeout; `None` leaves it to the transport.
    pub default_timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("SiteKit/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9,ru;q=0.8".to_string(),
            default_timeout: None,
            max_redirects: 10,
        }
    }
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.default_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        debug!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        req_builder = req_builder.header(header::ACCEPT_LANGUAGE, &self.config.accept_language);

        match request.cache {
            CacheMode::Default => {}
            CacheMode::NoCache => {
                req_builder = req_builder.header(header::CACHE_CONTROL, "no-cache");
            }
            CacheMode::NoStore => {
                req_builder = req_builder
                    .header(header::CACHE_CONTROL, "no-store")
                    .header(header::PRAGMA, "no-cache");
            }
        }

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response::new(url, status, headers, body))
    }
}

impl HttpFetcher {
    fn classify(&self, err: reqwest::Error) -> NetError {
        match self.config.default_timeout {
            Some(limit) if err.is_timeout() => NetError::Timeout(limit),
            _ if err.is_connect() => NetError::Offline(err.to_string()),
            _ => NetError::HttpError(err),
        }
    }
}
