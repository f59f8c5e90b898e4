use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use audiorelay_core::ServiceError;
use audiorelay_kv::KVStore;
use tracing::{info, warn};

use crate::model::{BackendDescriptor, BackendMode};
use crate::service::health::HealthMonitor;

/// KV key holding the persisted selection.
pub const ACTIVE_MODE_KEY: &str = "backend:active_mode";

/// Callback fired after the active mode is persisted. Receives the new mode.
///
/// Runs on the caller's task; implementations should be non-blocking.
pub type ModeListener = Arc<dyn Fn(BackendMode) + Send + Sync>;

/// Handle returned by [`BackendSelector::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

fn encode(mode: BackendMode) -> u8 {
    match mode {
        BackendMode::Local => 0,
        BackendMode::Web => 1,
    }
}

fn decode(raw: u8) -> BackendMode {
    match raw {
        1 => BackendMode::Web,
        _ => BackendMode::Local,
    }
}

/// Holds the active backend selection.
///
/// The selection is persisted in the KV store and mirrored in an atomic, so
/// reading it per request is a single load. Only `set_mode`, `select` and
/// `auto_select_best_server` change it; a request reads it once at its start.
pub struct BackendSelector {
    store: Arc<dyn KVStore>,
    monitor: Arc<HealthMonitor>,
    active: AtomicU8,
    // Held across persist + publish so the store and the mirror agree.
    write_lock: Mutex<()>,
    listeners: Mutex<Vec<(SubscriptionId, ModeListener)>>,
    next_id: AtomicU64,
}

impl BackendSelector {
    /// Load the persisted selection, defaulting to `local` on first run.
    pub fn new(store: Arc<dyn KVStore>, monitor: Arc<HealthMonitor>) -> Self {
        let initial = match store.get_string(ACTIVE_MODE_KEY) {
            Ok(Some(raw)) => raw.parse::<BackendMode>().unwrap_or_else(|_| {
                warn!(value = %raw, "ignoring unknown persisted backend mode");
                BackendMode::default()
            }),
            Ok(None) => BackendMode::default(),
            Err(e) => {
                warn!(error = %e, "failed to read persisted backend mode");
                BackendMode::default()
            }
        };
        info!(mode = %initial, "active backend");

        Self {
            store,
            monitor,
            active: AtomicU8::new(encode(initial)),
            write_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The currently active mode.
    pub fn active_mode(&self) -> BackendMode {
        decode(self.active.load(Ordering::Acquire))
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Snapshot of both backend descriptors.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.monitor.descriptors()
    }

    /// Validate a mode string, persist it and notify subscribers.
    pub fn set_mode(&self, mode: &str) -> Result<BackendMode, ServiceError> {
        let mode = mode.parse::<BackendMode>()?;
        self.select(mode)?;
        Ok(mode)
    }

    /// Persist `mode`, publish it to the in-memory mirror, then notify.
    ///
    /// Concurrent selections are serialized; the last one to persist is also
    /// the last one published. Listeners run after the lock is released.
    pub fn select(&self, mode: BackendMode) -> Result<(), ServiceError> {
        let previous = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.store
                .set_string(ACTIVE_MODE_KEY, mode.as_str())
                .map_err(|e| ServiceError::Internal(format!("persisting backend mode: {}", e)))?;
            decode(self.active.swap(encode(mode), Ordering::AcqRel))
        };

        if previous != mode {
            info!(from = %previous, to = %mode, "backend mode switched");
        }
        self.notify(mode);
        Ok(())
    }

    /// Probe one backend. Never fails.
    pub async fn check_health(&self, mode: BackendMode) -> bool {
        self.monitor.check_health(mode).await
    }

    /// Prefer the local mirror, fall back to the remote API, and degrade to
    /// the remote API when neither answers.
    pub async fn auto_select_best_server(&self) -> Result<BackendMode, ServiceError> {
        let chosen = if self.check_health(BackendMode::Local).await {
            BackendMode::Local
        } else if self.check_health(BackendMode::Web).await {
            BackendMode::Web
        } else {
            warn!("no backend answered its health probe; defaulting to web");
            BackendMode::Web
        };
        self.select(chosen)?;
        Ok(chosen)
    }

    /// Register a listener for mode changes.
    pub fn subscribe(&self, listener: ModeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let len = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() < len
    }

    fn notify(&self, mode: BackendMode) {
        // Clone out so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<ModeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(mode);
        }
    }
}
