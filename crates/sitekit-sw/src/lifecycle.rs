//! Install and activate.

use futures::future::try_join_all;
use serde::Serialize;
use sitekit_net::{Request, Response};
use tracing::{debug, error, info};

use crate::router::CacheRouter;
use crate::{ClientMessage, RouterEvent, ServiceWorkerError, ServiceWorkerState};

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Shell assets stored in the static partition.
    pub cached: Vec<String>,
    /// Partitions of another deployment were present; pages were told an
    /// update is available.
    pub update_announced: bool,
}

/// Result of activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Partitions removed, in the order they were found.
    pub deleted: Vec<String>,
}

impl CacheRouter {
    /// Precache the shell.
    ///
    /// Either every shell asset ends up in the static partition or none of
    /// them does; on failure the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.expect_state(ServiceWorkerState::Parsed, "install")?;
        self.inner.set_state(ServiceWorkerState::Installing);

        match self.precache().await {
            Ok(cached) => {
                self.inner.set_state(ServiceWorkerState::Installed);
                let update_announced = self.announce_if_replacing().await;
                info!(
                    version = %self.inner.config.version,
                    assets = cached.len(),
                    "Worker installed"
                );
                Ok(InstallReport {
                    cached,
                    update_announced,
                })
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                self.inner.set_state(ServiceWorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Remove partitions of other versions and take control of pages.
    pub async fn activate(&self) -> Result<ActivationReport, ServiceWorkerError> {
        self.expect_state(ServiceWorkerState::Installed, "activate")?;
        self.inner.set_state(ServiceWorkerState::Activating);

        let mut deleted = Vec::new();
        for name in self.inner.storage.keys().await {
            if self.inner.names.contains(&name) {
                continue;
            }
            if self.inner.storage.delete(&name).await {
                info!(partition = %name, "Deleted stale cache partition");
                deleted.push(name);
            }
        }

        self.inner.set_state(ServiceWorkerState::Activated);
        self.inner.emit(RouterEvent::ClientsClaimed);
        info!(version = %self.inner.config.version, deleted = deleted.len(), "Worker activated");

        Ok(ActivationReport { deleted })
    }

    /// Install, then activate.
    pub async fn start(&self) -> Result<(InstallReport, ActivationReport), ServiceWorkerError> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    fn expect_state(
        &self,
        expected: ServiceWorkerState,
        step: &str,
    ) -> Result<(), ServiceWorkerError> {
        let current = self.state();
        if current != expected {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot {step} from {current:?}"
            )));
        }
        Ok(())
    }

    async fn precache(&self) -> Result<Vec<String>, ServiceWorkerError> {
        let config = &self.inner.config;
        let requests = config
            .shell_assets
            .iter()
            .map(|asset| config.resolve(asset).map(Request::get))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|request| self.fetch_shell(request))).await?;

        let partition = self.inner.names.static_assets.as_str();
        self.inner
            .storage
            .put_all(partition, requests.iter().zip(&responses))
            .await?;

        debug!(partition, count = requests.len(), "Shell precached");
        Ok(requests.into_iter().map(|r| r.url.to_string()).collect())
    }

    async fn fetch_shell(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        let install_failed = |reason: String| ServiceWorkerError::InstallFailed {
            asset: request.url.to_string(),
            reason,
        };

        let response = self
            .inner
            .fetch(request)
            .await
            .map_err(|e| install_failed(e.to_string()))?;
        if !response.ok() {
            return Err(install_failed(format!("status {}", response.status)));
        }
        Ok(response)
    }

    /// Tell pages about the new version when another deployment's
    /// partitions are still around.
    async fn announce_if_replacing(&self) -> bool {
        let stale = self
            .inner
            .storage
            .keys()
            .await
            .into_iter()
            .any(|name| !self.inner.names.contains(&name));
        if stale {
            self.inner.emit(RouterEvent::Message(ClientMessage::UpdateAvailable {
                version: Some(self.inner.config.version.clone()),
            }));
        }
        stale
    }
}
