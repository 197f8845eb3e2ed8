//! The lifecycle bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sitekit_net::{CacheMode, Fetcher, Request};
use sitekit_sw::RouterEvent;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::host::{Registration, RegistrationOptions, ServiceWorkerHost, UpdateViaCache};
use crate::state::{BridgeEvent, ClientStatus, LifecycleState};
use crate::ClientError;

/// Registers the router and publishes its status.
pub struct ClientBridge {
    config: ClientConfig,
    host: Arc<dyn ServiceWorkerHost>,
    fetcher: Arc<dyn Fetcher>,
    status: watch::Sender<ClientStatus>,
    attempted: AtomicBool,
    registration: Mutex<Option<Registration>>,
}

impl ClientBridge {
    pub fn new(
        config: ClientConfig,
        host: Arc<dyn ServiceWorkerHost>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let lifecycle = if host.is_supported() {
            LifecycleState::Unregistered
        } else {
            LifecycleState::Unsupported
        };
        let initial = ClientStatus::new(lifecycle, host.connectivity(), host.has_controller());
        let (status, _) = watch::channel(initial);

        Self {
            config,
            host,
            fetcher,
            status,
            attempted: AtomicBool::new(false),
            registration: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current status snapshot.
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// Read-only status subscription.
    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    /// Feed one event into the state machine.
    pub fn dispatch(&self, event: BridgeEvent) -> bool {
        let changed = self.status.send_if_modified(|status| status.apply(&event));
        if changed {
            debug!(?event, lifecycle = ?self.status.borrow().lifecycle, "Bridge state changed");
        }
        changed
    }

    /// Register the router unless the host lacks support or the build
    /// profile disables it. Only the first call per bridge does anything.
    pub async fn register_if_supported(&self) -> LifecycleState {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return self.status().lifecycle;
        }

        if !self.host.is_supported() {
            debug!("Service workers not supported, skipping registration");
            return self.status().lifecycle;
        }

        if !self.config.enabled {
            info!("Service worker registration skipped (disabled by build profile)");
            return self.status().lifecycle;
        }

        self.dispatch(BridgeEvent::RegistrationStarted);

        match self.register().await {
            Ok(registration) => {
                info!(script = %registration.script_url, scope = %registration.scope, "Service worker registered");
                *self.registration.lock().await = Some(registration);
                self.dispatch(BridgeEvent::Registered);
            }
            Err(e) => {
                warn!(error = %e, "Service worker registration failed");
                self.dispatch(BridgeEvent::RegistrationError(e.to_string()));
            }
        }

        self.status().lifecycle
    }

    async fn register(&self) -> Result<Registration, ClientError> {
        let script = self.config.script()?;

        let preflight = Request::head(script.clone()).cache(CacheMode::NoCache);
        let response = self.fetcher.fetch(&preflight).await?;
        if !response.ok() {
            return Err(ClientError::ScriptNotFound(response.status.as_u16()));
        }

        let options = RegistrationOptions {
            scope: self.config.scope.clone(),
            update_via_cache: UpdateViaCache::None,
        };
        self.host.register(&script, &options).await
    }

    /// Ask the registration to update, then reload the page whatever the
    /// outcome. Without a registration this does nothing.
    pub async fn trigger_update(&self) {
        let registration = self.registration.lock().await.clone();
        let Some(registration) = registration else {
            debug!("No registration to update");
            return;
        };

        if let Err(e) = self.host.update(&registration).await {
            warn!(error = %e, "Service worker update failed");
        }
        self.host.reload().await;
    }

    /// Tear down the registration. Does not reload.
    pub async fn unregister(&self) {
        let mut slot = self.registration.lock().await;
        let Some(registration) = slot.as_ref() else {
            debug!("No registration to remove");
            return;
        };

        match self.host.unregister(registration).await {
            Ok(removed) => {
                info!(removed, "Service worker unregistered");
                *slot = None;
                drop(slot);
                self.dispatch(BridgeEvent::Unregistered);
            }
            Err(e) => warn!(error = %e, "Service worker unregistration failed"),
        }
    }

    /// Drive the bridge from host events until the sender goes away.
    pub fn spawn_event_loop(self: &Arc<Self>, mut events: mpsc::Receiver<BridgeEvent>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                bridge.dispatch(event);
            }
            debug!("Bridge event loop finished");
        })
    }

    /// Follow an in-process router: its messages and client claims become
    /// bridge events.
    pub fn spawn_router_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<RouterEvent>,
    ) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RouterEvent::Message(message)) => {
                        bridge.dispatch(BridgeEvent::MessageReceived(message));
                    }
                    Ok(RouterEvent::ClientsClaimed) => {
                        bridge.dispatch(BridgeEvent::ControllerChanged);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Bridge lagged behind router events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
