//! Router behavior against a scripted origin.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use serde_json::json;
use sitekit_cache::{CacheError, CacheStorage};
use sitekit_net::{
    Destination, MemoryFetcher, NetError, Request, Response, ResponseSource, Url,
};
use sitekit_sw::{
    CacheRouter, ClientMessage, FetchOutcome, RefreshOutcome, RequestClass, RouterConfig,
    RouterEvent, ServiceWorkerError, ServiceWorkerState,
};
use tokio::sync::broadcast;

const ORIGIN: &str = "http://localhost:3000";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Origin serving every default shell asset.
fn origin() -> Arc<MemoryFetcher> {
    let fetcher = Arc::new(MemoryFetcher::new());
    for asset in RouterConfig::default().shell_assets {
        fetcher.route(url(&asset).as_str(), 200, "text/html", format!("shell {asset}"));
    }
    fetcher
}

async fn started(config: RouterConfig, storage: CacheStorage, fetcher: Arc<MemoryFetcher>) -> CacheRouter {
    let router = CacheRouter::new(config, storage, fetcher).unwrap();
    router.start().await.unwrap();
    router
}

async fn respond(router: &CacheRouter, request: &Request) -> Response {
    router
        .handle_fetch(request)
        .await
        .unwrap()
        .into_response()
        .expect("router should answer")
}

async fn next_refresh(events: &mut broadcast::Receiver<RouterEvent>) -> (String, RefreshOutcome) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let RouterEvent::BackgroundRefresh { url, outcome } = events.recv().await.unwrap() {
                return (url, outcome);
            }
        }
    })
    .await
    .expect("refresh should settle")
}

#[tokio::test]
async fn test_post_passes_through() {
    let fetcher = origin();
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    let calls = fetcher.total_calls();

    let post = Request::post(url("/api/contact"), Bytes::from_static(b"{}"));
    let outcome = router.handle_fetch(&post).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::PassThrough));
    assert_eq!(fetcher.total_calls(), calls);
}

#[tokio::test]
async fn test_requests_pass_through_before_activation() {
    let fetcher = origin();
    let router = CacheRouter::new(RouterConfig::default(), CacheStorage::new(), fetcher).unwrap();
    router.install().await.unwrap();
    assert_eq!(router.state(), ServiceWorkerState::Installed);

    let outcome = router.handle_fetch(&Request::navigate(url("/"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassThrough));
}

#[tokio::test]
async fn test_static_asset_cache_first_offline() {
    let fetcher = origin();
    let css = url("/_next/static/css/app/page.css");
    fetcher.route(css.as_str(), 200, "text/css", "body{}");
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;

    let first = respond(&router, &Request::get(css.clone())).await;
    assert_eq!(first.source, ResponseSource::Network);

    fetcher.set_offline(true);
    for _ in 0..3 {
        let outcome = router.handle_fetch(&Request::get(css.clone())).await.unwrap();
        let FetchOutcome::Respond { class, response } = outcome else {
            panic!("expected a response");
        };
        assert_eq!(class, RequestClass::StaticAsset);
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, Bytes::from_static(b"body{}"));
    }
    assert_eq!(fetcher.calls(css.as_str()), 1);
}

#[tokio::test]
async fn test_static_asset_falls_back_to_any_partition() {
    let storage = CacheStorage::new();
    let fetcher = origin();
    let router = started(RouterConfig::default(), storage.clone(), fetcher.clone()).await;

    let font = url("/fonts/inter.woff2");
    let request = Request::get(font.clone());
    let stored = Response::new(font.clone(), StatusCode::OK, Default::default(), Bytes::from_static(b"font"));
    storage
        .put(&router.partitions().dynamic, &request, &stored)
        .await
        .unwrap();

    fetcher.set_offline(true);
    let response = respond(&router, &request).await;
    assert_eq!(response.body, Bytes::from_static(b"font"));
}

#[tokio::test]
async fn test_static_asset_miss_offline_is_an_error() {
    let fetcher = origin();
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    fetcher.set_offline(true);

    let result = router.handle_fetch(&Request::get(url("/vendor/lib.js"))).await;
    assert!(matches!(
        result,
        Err(ServiceWorkerError::Network(NetError::Offline(_)))
    ));
}

#[tokio::test]
async fn test_image_refreshes_in_background() {
    let storage = CacheStorage::new();
    let fetcher = origin();
    let photo = "https://images.unsplash.com/photo-1?w=800";
    fetcher.route(photo, 200, "image/jpeg", "old");
    let router = started(RouterConfig::default(), storage.clone(), fetcher.clone()).await;
    let request = Request::get(Url::parse(photo).unwrap());

    // Miss: fetched and stored.
    let first = respond(&router, &request).await;
    assert_eq!(first.body, Bytes::from_static(b"old"));
    assert_eq!(storage.partition_len(&router.partitions().images).await, Some(1));

    // Hit: cached bytes now, fresh bytes after the refresh settles.
    fetcher.route(photo, 200, "image/jpeg", "new");
    let mut events = router.subscribe();
    let second = respond(&router, &request).await;
    assert_eq!(second.body, Bytes::from_static(b"old"));
    assert_eq!(second.source, ResponseSource::Cache);

    let (refreshed, outcome) = next_refresh(&mut events).await;
    assert_eq!(refreshed, photo);
    assert_eq!(outcome, RefreshOutcome::Updated);

    let third = respond(&router, &request).await;
    assert_eq!(third.body, Bytes::from_static(b"new"));
}

#[tokio::test]
async fn test_image_refresh_failure_keeps_cache() {
    let fetcher = origin();
    let logo = url("/media/logo.png");
    fetcher.route(logo.as_str(), 200, "image/png", "png");
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    let request = Request::get(logo.clone()).destination(Destination::Image);
    respond(&router, &request).await;

    fetcher.set_offline(true);
    let mut events = router.subscribe();
    let cached = respond(&router, &request).await;
    assert_eq!(cached.body, Bytes::from_static(b"png"));

    let (_, outcome) = next_refresh(&mut events).await;
    assert!(matches!(outcome, RefreshOutcome::Failed(_)));

    let again = respond(&router, &request).await;
    assert_eq!(again.body, Bytes::from_static(b"png"));
}

#[tokio::test]
async fn test_image_miss_offline_is_404() {
    let fetcher = origin();
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    fetcher.set_offline(true);

    let response = respond(&router, &Request::get(url("/media/missing.webp"))).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.text().unwrap(), "Image not available offline");
}

#[tokio::test]
async fn test_navigation_fallback_chain() {
    let fetcher = origin();
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;

    fetcher.serve(url("/work/branding").as_str(), "branding");
    respond(&router, &Request::navigate(url("/work/branding"))).await;
    fetcher.set_offline(true);

    // Cached exact page.
    let page = respond(&router, &Request::navigate(url("/work/branding"))).await;
    assert_eq!(page.text().unwrap(), "branding");

    // Uncached page: the precached root document.
    let root = respond(&router, &Request::navigate(url("/work/unknown"))).await;
    assert_eq!(root.text().unwrap(), "shell /");
}

#[tokio::test]
async fn test_navigation_offline_page_without_root() {
    let fetcher = origin();
    let config = RouterConfig {
        shell_assets: vec!["/about".into()],
        ..Default::default()
    };
    let router = started(config, CacheStorage::new(), fetcher.clone()).await;
    fetcher.set_offline(true);

    let response = respond(&router, &Request::navigate(url("/work"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.source, ResponseSource::Synthetic);
    assert!(response.text().unwrap().contains("You're Offline"));
}

#[tokio::test]
async fn test_network_first_non_2xx_not_cached() {
    let storage = CacheStorage::new();
    let fetcher = origin();
    let api = url("/api/projects");
    fetcher.route(api.as_str(), 500, "application/json", "{}");
    let router = started(RouterConfig::default(), storage.clone(), fetcher.clone()).await;

    let response = respond(&router, &Request::get(api.clone())).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    fetcher.set_offline(true);
    let offline = respond(&router, &Request::get(api)).await;
    assert_eq!(offline.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(offline.text().unwrap(), "Content not available offline");
    assert!(!storage.has(&router.partitions().dynamic).await);
}

#[tokio::test]
async fn test_network_first_serves_cached_copy_offline() {
    let fetcher = origin();
    let api = url("/api/projects");
    fetcher.route(api.as_str(), 200, "application/json", "[1,2]");
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    respond(&router, &Request::get(api.clone())).await;

    fetcher.set_offline(true);
    let response = respond(&router, &Request::get(api)).await;
    assert_eq!(response.body, Bytes::from_static(b"[1,2]"));
    assert_eq!(response.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_default_strategy_offline() {
    let fetcher = origin();
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    fetcher.set_offline(true);

    let response = respond(&router, &Request::get(url("/feed.xml"))).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().unwrap(), "Not available offline");
}

#[tokio::test]
async fn test_fetch_timeout_counts_as_failure() {
    let fetcher = origin();
    let api = url("/api/slow");
    fetcher.hang(api.as_str());
    let config = RouterConfig {
        fetch_timeout_ms: Some(50),
        ..Default::default()
    };
    let router = started(config, CacheStorage::new(), fetcher).await;

    let response = respond(&router, &Request::get(api)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_quota_exceeded_is_not_fatal() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.serve(url("/").as_str(), "home");
    let api = url("/api/big");
    fetcher.serve(api.as_str(), vec![b'x'; 256]);
    let config = RouterConfig {
        shell_assets: vec!["/".into()],
        ..Default::default()
    };
    let storage = CacheStorage::with_quota(64);
    let router = started(config, storage.clone(), fetcher).await;

    let response = respond(&router, &Request::get(api)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.len(), 256);
    assert!(!storage.has(&router.partitions().dynamic).await);
}

#[tokio::test]
async fn test_activation_removes_only_stale_partitions() {
    let storage = CacheStorage::new();
    let seed = Request::get(url("/"));
    let seeded = Response::new(url("/"), StatusCode::OK, Default::default(), Bytes::from_static(b"v1"));
    for name in [
        "portfolio-static-v1.0.0",
        "portfolio-dynamic-v1.0.0",
        "portfolio-static-v2.0.0",
    ] {
        storage.put(name, &seed, &seeded).await.unwrap();
    }

    let config = RouterConfig {
        version: "2.0.0".into(),
        ..Default::default()
    };
    let router = CacheRouter::new(config, storage.clone(), origin()).unwrap();
    let mut events = router.subscribe();

    let installed = router.install().await.unwrap();
    assert!(installed.update_announced);
    let activated = router.activate().await.unwrap();

    assert_eq!(
        activated.deleted,
        vec!["portfolio-static-v1.0.0", "portfolio-dynamic-v1.0.0"]
    );
    assert_eq!(storage.keys().await, vec!["portfolio-static-v2.0.0"]);
    assert!(!storage.has("portfolio-dynamic-v2.0.0").await);
    assert!(!storage.has("portfolio-images-v2.0.0").await);

    let mut announced = false;
    let mut claimed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            RouterEvent::Message(ClientMessage::UpdateAvailable { version }) => {
                assert_eq!(version.as_deref(), Some("2.0.0"));
                announced = true;
            }
            RouterEvent::ClientsClaimed => claimed = true,
            _ => {}
        }
    }
    assert!(announced && claimed);
}

#[tokio::test]
async fn test_install_failure_stores_nothing() {
    let storage = CacheStorage::new();
    let fetcher = origin();
    fetcher.route(url("/contact").as_str(), 404, "text/html", "gone");
    let router = CacheRouter::new(RouterConfig::default(), storage.clone(), fetcher).unwrap();

    let err = router.install().await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::InstallFailed { .. }));
    assert_eq!(router.state(), ServiceWorkerState::Redundant);
    assert!(storage.keys().await.is_empty());
}

#[tokio::test]
async fn test_image_refresh_skips_error_status() {
    let fetcher = origin();
    let logo = url("/media/logo.png");
    fetcher.route(logo.as_str(), 200, "image/png", "png");
    let router = started(RouterConfig::default(), CacheStorage::new(), fetcher.clone()).await;
    let request = Request::get(logo.clone()).destination(Destination::Image);
    respond(&router, &request).await;

    fetcher.route(logo.as_str(), 500, "text/plain", "oops");
    let mut events = router.subscribe();
    let cached = respond(&router, &request).await;
    assert_eq!(cached.source, ResponseSource::Cache);

    let (refreshed, outcome) = next_refresh(&mut events).await;
    assert_eq!(refreshed, logo.as_str());
    assert_eq!(outcome, RefreshOutcome::Skipped(500));

    let again = respond(&router, &request).await;
    assert_eq!(again.body, Bytes::from_static(b"png"));
}

/// Entry whose stored header can no longer be rebuilt.
fn corrupted_entry(path: &str) -> (String, serde_json::Value) {
    let key = url(path).to_string();
    let entry = json!({
        "url": key,
        "method": "GET",
        "status": 200,
        "headers": [["bad header", "x"]],
        "body": "b2xk",
        "cached_at": 0,
    });
    (key, entry)
}

fn partition(name: &str, paths: &[&str]) -> serde_json::Value {
    let entries: serde_json::Map<String, serde_json::Value> =
        paths.iter().map(|path| corrupted_entry(path)).collect();
    json!({ "name": name, "entries": entries })
}

#[tokio::test]
async fn test_corrupted_snapshot_entries() {
    let config = RouterConfig {
        shell_assets: vec!["/about".into()],
        ..Default::default()
    };
    let names = config.partition_names();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.json");
    let snapshot = json!({
        "version": 1,
        "partitions": [
            partition(&names.images, &["/media/broken.png"]),
            partition(&names.static_assets, &["/vendor/broken.js"]),
            partition(&names.dynamic, &["/work/broken", "/"]),
        ],
    });
    std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();
    let storage = CacheStorage::load(&path).await.unwrap();

    let fetcher = origin();
    let router = started(config, storage.clone(), fetcher.clone()).await;
    fetcher.set_offline(true);

    // Static: the rebuild error is what the caller sees.
    let result = router.handle_fetch(&Request::get(url("/vendor/broken.js"))).await;
    assert!(matches!(
        result,
        Err(ServiceWorkerError::Cache(CacheError::Corrupted { .. }))
    ));

    // Navigation: neither the page nor the root is usable.
    let page = respond(&router, &Request::navigate(url("/work/broken"))).await;
    assert_eq!(page.source, ResponseSource::Synthetic);
    assert!(page.text().unwrap().contains("You're Offline"));

    // Image: treated as a miss, so offline means 404 ...
    let image = Request::get(url("/media/broken.png"));
    let missing = respond(&router, &image).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    // ... and online the network copy replaces the broken entry.
    fetcher.set_offline(false);
    fetcher.route(image.url.as_str(), 200, "image/png", "fresh");
    let fetched = respond(&router, &image).await;
    assert_eq!(fetched.source, ResponseSource::Network);

    fetcher.set_offline(true);
    let repaired = respond(&router, &image).await;
    assert_eq!(repaired.source, ResponseSource::Cache);
    assert_eq!(repaired.body, Bytes::from_static(b"fresh"));
}
