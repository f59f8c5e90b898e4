use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use audiorelay_core::now;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{BackendDescriptor, BackendMode};

/// Liveness check against a backend's `/health` endpoint.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    /// Return whether `base_url` answered healthy. Never fails.
    async fn probe(&self, mode: BackendMode, base_url: &str) -> bool;
}

/// Probes `GET {base_url}/health` with a bounded timeout.
pub struct HttpHealthProbe {
    client: Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, mode: BackendMode, base_url: &str) -> bool {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let result = tokio::time::timeout(
            self.timeout,
            self.client.get(&url).timeout(self.timeout).send(),
        )
        .await;

        match result {
            Ok(Ok(resp)) if resp.status().is_success() => true,
            Ok(Ok(resp)) => {
                debug!(%mode, status = %resp.status(), "health probe: non-success status");
                false
            }
            Ok(Err(e)) => {
                debug!(%mode, error = %e.without_url(), "health probe: request failed");
                false
            }
            Err(_) => {
                debug!(%mode, timeout = ?self.timeout, "health probe: timed out");
                false
            }
        }
    }
}

/// Owner of the per-backend health cache.
///
/// Descriptors are read by anyone; they are written only here, and every
/// update replaces the whole descriptor in a single assignment.
pub struct HealthMonitor {
    local: RwLock<BackendDescriptor>,
    web: RwLock<BackendDescriptor>,
    probe: Arc<dyn HealthProbe>,
}

impl HealthMonitor {
    pub fn new(local_url: impl Into<String>, web_url: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            local: RwLock::new(BackendDescriptor::new(BackendMode::Local, local_url)),
            web: RwLock::new(BackendDescriptor::new(BackendMode::Web, web_url)),
            probe,
        }
    }

    fn slot(&self, mode: BackendMode) -> &RwLock<BackendDescriptor> {
        match mode {
            BackendMode::Local => &self.local,
            BackendMode::Web => &self.web,
        }
    }

    /// Snapshot of one descriptor.
    pub fn descriptor(&self, mode: BackendMode) -> BackendDescriptor {
        self.slot(mode)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshots of both descriptors, local first.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        BackendMode::ALL.iter().map(|m| self.descriptor(*m)).collect()
    }

    /// Probe one backend and record the result. Returns false on timeout,
    /// refusal or non-success status.
    pub async fn check_health(&self, mode: BackendMode) -> bool {
        let base_url = self.descriptor(mode).base_url;
        let healthy = self.probe.probe(mode, &base_url).await;

        let updated = BackendDescriptor {
            mode,
            base_url,
            healthy,
            last_checked_at: Some(now()),
        };
        *self.slot(mode).write().unwrap_or_else(PoisonError::into_inner) = updated;

        debug!(%mode, healthy, "health check recorded");
        healthy
    }
}

/// Start the background refresher that re-probes both backends every
/// `interval`. It only updates descriptors; the active selection is left alone.
///
/// Returns a CancellationToken that stops the loop when cancelled.
pub fn start_refresher(monitor: Arc<HealthMonitor>, interval: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        info!("backend health refresher started (interval={interval:?})");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("backend health refresher stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    for mode in BackendMode::ALL {
                        let healthy = monitor.check_health(mode).await;
                        if !healthy {
                            warn!(%mode, "backend failed periodic health check");
                        }
                    }
                }
            }
        }
    });

    cancel
}
