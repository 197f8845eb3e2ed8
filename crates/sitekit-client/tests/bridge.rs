//! Bridge behavior against a scripted host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sitekit_cache::CacheStorage;
use sitekit_client::{
    BridgeEvent, ClientBridge, ClientConfig, ClientError, ClientStatus, ConnectionQuality,
    Connectivity, LifecycleState, Registration, RegistrationOptions, ServiceWorkerHost,
    UpdateViaCache,
};
use sitekit_net::{CacheMode, Fetcher, MemoryFetcher, NetError, Request, Response};
use sitekit_sw::{CacheRouter, ClientMessage, RouterConfig};
use tokio::sync::{mpsc, watch};
use url::Url;

const SCRIPT: &str = "http://localhost:3000/sw.js";

#[derive(Default)]
struct MockHost {
    unsupported: bool,
    controller: bool,
    fail_register: bool,
    fail_update: bool,
    registrations: Mutex<Vec<RegistrationOptions>>,
    updates: AtomicUsize,
    reloads: AtomicUsize,
    unregistered: AtomicBool,
}

#[async_trait]
impl ServiceWorkerHost for MockHost {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    fn has_controller(&self) -> bool {
        self.controller
    }

    async fn register(
        &self,
        script_url: &Url,
        options: &RegistrationOptions,
    ) -> Result<Registration, ClientError> {
        if self.fail_register {
            return Err(ClientError::Registration("SecurityError".into()));
        }
        self.registrations.lock().unwrap().push(options.clone());
        Ok(Registration {
            script_url: script_url.clone(),
            scope: script_url.join(&options.scope).unwrap(),
        })
    }

    async fn update(&self, _registration: &Registration) -> Result<(), ClientError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(ClientError::Host("update check failed".into()));
        }
        Ok(())
    }

    async fn unregister(&self, _registration: &Registration) -> Result<bool, ClientError> {
        self.unregistered.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records preflight requests so the cache mode can be checked.
struct RecordingFetcher {
    inner: MemoryFetcher,
    seen: Mutex<Vec<(http::Method, CacheMode)>>,
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.seen
            .lock()
            .unwrap()
            .push((request.method.clone(), request.cache));
        self.inner.fetch(request).await
    }
}

fn script_origin() -> Arc<MemoryFetcher> {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.route(SCRIPT, 200, "text/javascript", "self.addEventListener('fetch', () => {})");
    fetcher
}

fn enabled() -> ClientConfig {
    ClientConfig {
        enabled: true,
        ..Default::default()
    }
}

async fn registered(host: Arc<MockHost>) -> ClientBridge {
    let bridge = ClientBridge::new(enabled(), host, script_origin());
    assert_eq!(
        bridge.register_if_supported().await,
        LifecycleState::RegisteredActive
    );
    bridge
}

async fn wait_for(
    status: &mut watch::Receiver<ClientStatus>,
    check: impl Fn(&ClientStatus) -> bool,
) -> ClientStatus {
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| check(s)))
        .await
        .expect("status should change")
        .expect("bridge alive")
        .clone()
}

#[tokio::test]
async fn test_registers_once_with_preflight() {
    let host = Arc::new(MockHost::default());
    let fetcher = Arc::new(RecordingFetcher {
        inner: MemoryFetcher::new(),
        seen: Mutex::new(Vec::new()),
    });
    fetcher.inner.serve(SCRIPT, "worker");
    let bridge = ClientBridge::new(enabled(), host.clone(), fetcher.clone());

    assert_eq!(bridge.register_if_supported().await, LifecycleState::RegisteredActive);
    assert_eq!(bridge.register_if_supported().await, LifecycleState::RegisteredActive);

    let registrations = host.registrations.lock().unwrap().clone();
    assert_eq!(
        registrations,
        vec![RegistrationOptions {
            scope: "/".into(),
            update_via_cache: UpdateViaCache::None,
        }]
    );
    assert_eq!(
        fetcher.seen.lock().unwrap().as_slice(),
        &[(http::Method::HEAD, CacheMode::NoCache)]
    );
}

#[tokio::test]
async fn test_unsupported_host() {
    let host = Arc::new(MockHost {
        unsupported: true,
        ..Default::default()
    });
    let fetcher = script_origin();
    let bridge = ClientBridge::new(enabled(), host.clone(), fetcher.clone());

    assert_eq!(bridge.register_if_supported().await, LifecycleState::Unsupported);
    assert!(host.registrations.lock().unwrap().is_empty());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_disabled_profile_skips_registration() {
    let host = Arc::new(MockHost::default());
    let bridge = ClientBridge::new(ClientConfig::default(), host.clone(), script_origin());

    assert_eq!(bridge.register_if_supported().await, LifecycleState::Unregistered);
    assert!(host.registrations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_script_is_recorded() {
    let host = Arc::new(MockHost::default());
    let bridge = ClientBridge::new(enabled(), host.clone(), Arc::new(MemoryFetcher::new()));

    let state = bridge.register_if_supported().await;
    assert!(matches!(state, LifecycleState::Error(ref m) if m.contains("404")));
    assert!(host.registrations.lock().unwrap().is_empty());
    assert!(bridge.status().error().is_some());
}

#[tokio::test]
async fn test_host_rejection_is_recorded() {
    let host = Arc::new(MockHost {
        fail_register: true,
        ..Default::default()
    });
    let bridge = ClientBridge::new(enabled(), host, script_origin());

    let state = bridge.register_if_supported().await;
    assert_eq!(
        state,
        LifecycleState::Error("Registration failed: SecurityError".into())
    );
}

#[tokio::test]
async fn test_update_via_installed_worker() {
    let host = Arc::new(MockHost {
        controller: true,
        ..Default::default()
    });
    let bridge = registered(host).await;

    bridge.dispatch(BridgeEvent::InstallFound);
    assert!(bridge.status().installing);

    bridge.dispatch(BridgeEvent::WorkerInstalled {
        controller_present: true,
    });
    let status = bridge.status();
    assert!(status.update_available());
    assert!(!status.installing);
}

#[tokio::test]
async fn test_first_install_is_not_an_update() {
    let bridge = registered(Arc::new(MockHost::default())).await;

    bridge.dispatch(BridgeEvent::InstallFound);
    bridge.dispatch(BridgeEvent::WorkerInstalled {
        controller_present: false,
    });
    assert_eq!(bridge.status().lifecycle, LifecycleState::RegisteredActive);
}

#[tokio::test]
async fn test_update_via_router_message() {
    let bridge = Arc::new(registered(Arc::new(MockHost::default())).await);
    let (tx, rx) = mpsc::channel(8);
    let handle = bridge.spawn_event_loop(rx);
    let mut status = bridge.subscribe();

    let event = BridgeEvent::from_message_json(r#"{"type":"SW_UPDATE_AVAILABLE"}"#).unwrap();
    tx.send(event).await.unwrap();

    let status = wait_for(&mut status, ClientStatus::update_available).await;
    assert_eq!(status.lifecycle, LifecycleState::UpdateAvailable);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_update_announced_by_router() {
    let bridge = Arc::new(registered(Arc::new(MockHost::default())).await);

    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.serve("http://localhost:3000/", "home");
    let storage = CacheStorage::new();
    let seed = Request::get(Url::parse("http://localhost:3000/").unwrap());
    let old = fetcher.fetch(&seed).await.unwrap();
    storage.put("portfolio-static-v0.9.0", &seed, &old).await.unwrap();

    let config = RouterConfig {
        shell_assets: vec!["/".into()],
        ..Default::default()
    };
    let router = CacheRouter::new(config, storage, fetcher).unwrap();
    let listener = bridge.spawn_router_listener(router.subscribe());
    let mut status = bridge.subscribe();

    router.start().await.unwrap();

    let status = wait_for(&mut status, |s| s.update_available() && s.controlled).await;
    assert_eq!(status.lifecycle, LifecycleState::UpdateAvailable);

    drop(router);
    listener.await.unwrap();
}

#[tokio::test]
async fn test_trigger_update_always_reloads() {
    let host = Arc::new(MockHost {
        fail_update: true,
        ..Default::default()
    });
    let bridge = registered(host.clone()).await;

    bridge.trigger_update().await;
    assert_eq!(host.updates.load(Ordering::SeqCst), 1);
    assert_eq!(host.reloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_trigger_update_without_registration() {
    let host = Arc::new(MockHost::default());
    let bridge = ClientBridge::new(ClientConfig::default(), host.clone(), script_origin());

    bridge.trigger_update().await;
    assert_eq!(host.updates.load(Ordering::SeqCst), 0);
    assert_eq!(host.reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unregister_does_not_reload() {
    let host = Arc::new(MockHost::default());
    let bridge = registered(host.clone()).await;

    bridge.unregister().await;
    assert!(host.unregistered.load(Ordering::SeqCst));
    assert_eq!(host.reloads.load(Ordering::SeqCst), 0);
    assert_eq!(bridge.status().lifecycle, LifecycleState::Unregistered);
}

#[tokio::test]
async fn test_connectivity_events() {
    let bridge = registered(Arc::new(MockHost::default())).await;
    assert_eq!(bridge.status().connectivity, Connectivity::online());

    bridge.dispatch(BridgeEvent::Offline);
    assert_eq!(bridge.status().connectivity.summary(), "Offline");

    bridge.dispatch(BridgeEvent::Online);
    bridge.dispatch(BridgeEvent::ConnectionChanged(Some(ConnectionQuality {
        connection_type: "wifi".into(),
        effective_type: "4g".into(),
        downlink_mbps: 10.0,
        rtt_ms: 50,
    })));
    assert_eq!(
        bridge.status().connectivity.summary(),
        "Online (4G) 10.0 Mbps • 50ms"
    );
    // Connectivity never touches the lifecycle.
    assert_eq!(bridge.status().lifecycle, LifecycleState::RegisteredActive);
}

#[tokio::test]
async fn test_update_message_ignored_before_registration() {
    let bridge = ClientBridge::new(ClientConfig::default(), Arc::new(MockHost::default()), script_origin());
    bridge.dispatch(BridgeEvent::MessageReceived(ClientMessage::UpdateAvailable {
        version: None,
    }));
    assert_eq!(bridge.status().lifecycle, LifecycleState::Unregistered);
}
