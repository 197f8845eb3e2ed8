//! Request classification.
//!
//! Classification is an ordered list of rules; the first rule whose matcher
//! accepts the request decides its class, and anything no rule accepts is
//! [`RequestClass::Default`].

use http::Method;
use serde::Serialize;
use sitekit_net::{Destination, Request, RequestMode};
use tracing::trace;

use crate::config::RouterConfig;

/// Caching strategy category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestClass {
    Image,
    StaticAsset,
    NetworkFirst,
    Navigation,
    Default,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Image => "image",
            RequestClass::StaticAsset => "static-asset",
            RequestClass::NetworkFirst => "network-first",
            RequestClass::Navigation => "navigation",
            RequestClass::Default => "default",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Hostname equals one of these, or is a subdomain of one.
    HostIn(Vec<String>),
    /// Reported destination.
    Destination(Destination),
    /// Path ends in `.<ext>` for one of these (case-insensitive).
    PathExtension(Vec<String>),
    /// Path starts with one of these.
    PathPrefix(Vec<String>),
    /// Request mode.
    Mode(RequestMode),
    /// Any of the inner matchers.
    AnyOf(Vec<Matcher>),
}

impl Matcher {
    /// Check if a request matches.
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::HostIn(hosts) => request
                .url
                .host_str()
                .map(|host| hosts.iter().any(|allowed| host_matches(host, allowed)))
                .unwrap_or(false),
            Matcher::Destination(destination) => request.destination == *destination,
            Matcher::PathExtension(extensions) => path_extension(request.url.path())
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
            Matcher::PathPrefix(prefixes) => {
                let path = request.url.path();
                prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
            }
            Matcher::Mode(mode) => request.mode == *mode,
            Matcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(request)),
        }
    }
}

fn host_matches(host: &str, allowed: &str) -> bool {
    let host = host.trim_end_matches('.');
    host.eq_ignore_ascii_case(allowed)
        || host
            .len()
            .checked_sub(allowed.len() + 1)
            .map(|split| {
                host.as_bytes()[split] == b'.' && host[split + 1..].eq_ignore_ascii_case(allowed)
            })
            .unwrap_or(false)
}

/// Extension of the last path segment, if any.
fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

/// One classification rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub matcher: Matcher,
    pub class: RequestClass,
}

impl Rule {
    pub fn new(matcher: Matcher, class: RequestClass) -> Self {
        Self { matcher, class }
    }
}

/// Ordered rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build from an explicit rule list, evaluated in order.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The site's rule table.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(vec![
            Rule::new(
                Matcher::AnyOf(vec![
                    Matcher::HostIn(config.image_hosts.clone()),
                    Matcher::Destination(Destination::Image),
                    Matcher::PathExtension(config.image_extensions.clone()),
                ]),
                RequestClass::Image,
            ),
            Rule::new(
                Matcher::AnyOf(vec![
                    Matcher::PathPrefix(config.cache_first_prefixes.clone()),
                    Matcher::PathExtension(config.static_extensions.clone()),
                ]),
                RequestClass::StaticAsset,
            ),
            Rule::new(
                Matcher::PathPrefix(config.network_first_prefixes.clone()),
                RequestClass::NetworkFirst,
            ),
            Rule::new(Matcher::Mode(RequestMode::Navigate), RequestClass::Navigation),
        ])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a request. Total: unmatched requests are `Default`.
    pub fn classify(&self, request: &Request) -> RequestClass {
        let class = self
            .rules
            .iter()
            .find(|rule| rule.matcher.matches(request))
            .map(|rule| rule.class)
            .unwrap_or(RequestClass::Default);
        trace!(url = %request.url, class = %class, "Classified request");
        class
    }
}

/// Whether the router should handle a request at all: GET over http(s).
pub fn should_intercept(request: &Request) -> bool {
    request.method == Method::GET && request.is_http()
}
