//! Connection Supervisor
//!
//! Drives every configured backend toward readiness on a fixed interval.
//! Polling converges once: on the first tick where every backend is ready
//! the task stops and `AllReady` is emitted. Afterwards only an explicit
//! reconfiguration or reset brings a backend back to not-ready and
//! restarts polling.

use super::{BackendHandle, BackendStatus, ReconcileResult, SessionSettings};
use crate::config::manager::validate_backends;
use crate::config::{BackendConfig, HostUpdate};
use crate::error::ControlError;
use crate::metrics::Metrics;
use crate::observer::{StatusEvent, StatusHub, StatusObserver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// A backend together with the configuration it was built from
struct ManagedBackend {
    config: BackendConfig,
    handle: Arc<Mutex<BackendHandle>>,
    /// Last readiness reported to observers
    reported: Option<bool>,
}

#[derive(Default)]
struct PollState {
    interval: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

struct SupervisorInner {
    backends: RwLock<Vec<ManagedBackend>>,
    settings: SessionSettings,
    all_ready: AtomicBool,
    ticks: AtomicU64,
    tick_lock: Mutex<()>,
    poll: std::sync::Mutex<PollState>,
    hub: StatusHub,
    metrics: Arc<Metrics>,
}

/// Owns the backend handles and the reconciliation schedule
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    /// Create a supervisor for `backends`; the set is validated first
    pub fn new(
        backends: Vec<BackendConfig>,
        settings: SessionSettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ControlError> {
        validate_backends(&backends)?;

        let managed = backends
            .into_iter()
            .map(|config| ManagedBackend::new(config, settings))
            .collect();

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                backends: RwLock::new(managed),
                settings,
                all_ready: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                tick_lock: Mutex::new(()),
                poll: std::sync::Mutex::new(PollState::default()),
                hub: StatusHub::new(),
                metrics,
            }),
        })
    }

    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) {
        self.inner.hub.register(observer);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.hub.subscribe()
    }

    pub fn is_all_ready(&self) -> bool {
        self.inner.all_ready.load(Ordering::SeqCst)
    }

    /// Reconciliation ticks executed so far
    pub fn tick_count(&self) -> u64 {
        self.inner.ticks.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poll
            .lock()
            .map(|poll| poll.task.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Begin periodic reconciliation
    pub fn start(&self, poll_interval: Duration) {
        if let Ok(mut poll) = self.inner.poll.lock() {
            poll.interval = Some(poll_interval);
        }
        info!(interval = ?poll_interval, "Starting backend reconciliation");
        self.spawn_polling();
    }

    /// Stop the polling task without touching any session
    pub fn stop_polling(&self) {
        if let Ok(mut poll) = self.inner.poll.lock() {
            if let Some(task) = poll.task.take() {
                task.abort();
                debug!("Polling task stopped");
            }
        }
    }

    /// One reconciliation pass over every backend; returns whether all are ready
    pub async fn tick(&self) -> bool {
        self.inner.tick().await
    }

    /// Replace the backend set; changed and removed backends are torn down
    pub async fn reconfigure(&self, backends: Vec<BackendConfig>) -> Result<bool, ControlError> {
        validate_backends(&backends)?;

        let changed = {
            let _tick = self.inner.tick_lock.lock().await;
            self.inner.apply_backends(backends).await
        };

        if changed {
            info!("Backend configuration changed, reconnecting");
            self.restart_polling();
        } else {
            debug!("Backend configuration unchanged");
        }
        Ok(changed)
    }

    /// Replace the host of the named backends
    pub async fn apply_hosts(&self, updates: &[HostUpdate]) -> Result<bool, ControlError> {
        let mut configs = self.backend_configs().await;
        for update in updates {
            if update.host.trim().is_empty() {
                return Err(ControlError::Config(format!(
                    "{}: IP address cannot be empty",
                    update.name
                )));
            }
            let Some(config) = configs.iter_mut().find(|c| c.name == update.name) else {
                return Err(ControlError::Config(format!(
                    "Unknown backend: {}",
                    update.name
                )));
            };
            config.host = update.host.trim().to_string();
        }

        self.reconfigure(configs).await
    }

    /// Tear one backend down so the next ticks reconnect it
    pub async fn reset_backend(&self, name: &str) -> Result<(), ControlError> {
        {
            let _tick = self.inner.tick_lock.lock().await;
            let mut backends = self.inner.backends.write().await;
            let Some(managed) = backends.iter_mut().find(|b| b.config.name == name) else {
                return Err(ControlError::Config(format!("Unknown backend: {}", name)));
            };

            managed.handle.lock().await.teardown().await;
            if managed.reported == Some(true) {
                self.inner.hub.backend_status_changed(name, false);
            }
            managed.reported = Some(false);
            self.inner.all_ready.store(false, Ordering::SeqCst);
            self.inner.refresh_ready_gauge(&backends).await;
        }

        info!(backend = name, "Backend reset");
        self.restart_polling();
        Ok(())
    }

    /// Stop polling and close every session
    pub async fn shutdown(&self) {
        self.stop_polling();
        if let Ok(mut poll) = self.inner.poll.lock() {
            poll.interval = None;
        }

        let _tick = self.inner.tick_lock.lock().await;
        let backends = self.inner.backends.read().await;
        for managed in backends.iter() {
            managed.handle.lock().await.teardown().await;
        }
        self.inner.all_ready.store(false, Ordering::SeqCst);
        self.inner.metrics.set_backends_ready(0);
        info!("All backend sessions closed");
    }

    pub async fn backend_statuses(&self) -> Vec<BackendStatus> {
        let backends = self.inner.backends.read().await;
        let mut statuses = Vec::with_capacity(backends.len());
        for managed in backends.iter() {
            statuses.push(managed.handle.lock().await.status());
        }
        statuses
    }

    pub async fn backend_configs(&self) -> Vec<BackendConfig> {
        self.inner
            .backends
            .read()
            .await
            .iter()
            .map(|b| b.config.clone())
            .collect()
    }

    /// Handles in configuration order, for command dispatch
    pub(crate) async fn backend_handles(&self) -> Vec<(String, Arc<Mutex<BackendHandle>>)> {
        self.inner
            .backends
            .read()
            .await
            .iter()
            .map(|b| (b.config.name.clone(), Arc::clone(&b.handle)))
            .collect()
    }

    fn restart_polling(&self) {
        let started = self
            .inner
            .poll
            .lock()
            .map(|poll| poll.interval.is_some())
            .unwrap_or(false);
        if started {
            self.spawn_polling();
        }
    }

    fn spawn_polling(&self) {
        let Ok(mut poll) = self.inner.poll.lock() else {
            error!("Polling state lock poisoned");
            return;
        };
        let Some(period) = poll.interval else {
            return;
        };
        // A live task rechecks readiness under this lock before it exits
        if poll.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        poll.task = Some(tokio::spawn(poll_loop(weak, period)));
    }
}

async fn poll_loop(inner: Weak<SupervisorInner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.tick().await && inner.finish_polling() {
            debug!("Polling stopped, every backend is ready");
            break;
        }
    }
}

impl ManagedBackend {
    fn new(config: BackendConfig, settings: SessionSettings) -> Self {
        let handle = BackendHandle::new(config.name.clone(), config.endpoints(), settings);
        Self {
            config,
            handle: Arc::new(Mutex::new(handle)),
            reported: None,
        }
    }
}

impl SupervisorInner {
    /// Release the poll slot if every backend is still ready
    ///
    /// Runs under the poll lock, so a reset or reconfigure either sees the
    /// slot empty and spawns a new task, or keeps this one looping.
    fn finish_polling(&self) -> bool {
        let Ok(mut poll) = self.poll.lock() else {
            return true;
        };
        if poll.interval.is_some() && !self.all_ready.load(Ordering::SeqCst) {
            return false;
        }
        poll.task = None;
        true
    }

    async fn tick(&self) -> bool {
        let _tick = self.tick_lock.lock().await;
        if self.all_ready.load(Ordering::SeqCst) {
            return true;
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.record_tick();

        let mut backends = self.backends.write().await;
        let mut set = JoinSet::new();
        for (index, managed) in backends.iter().enumerate() {
            let handle = Arc::clone(&managed.handle);
            set.spawn(async move {
                let mut backend = handle.lock().await;
                (index, backend.reconcile().await)
            });
        }

        let mut results: Vec<Option<ReconcileResult>> = vec![None; backends.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Reconcile task failed: {}", e),
            }
        }

        let mut ready_count = 0;
        for (managed, result) in backends.iter_mut().zip(results) {
            let ready = match result {
                Some(result) => {
                    self.metrics.record_reconcile(&result);
                    result.ready
                }
                None => false,
            };
            if ready {
                ready_count += 1;
            }
            if managed.reported != Some(ready) {
                managed.reported = Some(ready);
                self.hub.backend_status_changed(&managed.config.name, ready);
            }
        }

        self.metrics.set_backends_ready(ready_count);
        let all_ready = ready_count == backends.len();
        debug!(tick, ready = ready_count, total = backends.len(), "Reconciliation tick finished");

        if all_ready && !self.all_ready.swap(true, Ordering::SeqCst) {
            info!(backends = backends.len(), "All backends ready");
            self.hub.all_ready();
        }
        all_ready
    }

    /// Swap in a validated backend set; returns whether anything changed
    async fn apply_backends(&self, configs: Vec<BackendConfig>) -> bool {
        let mut backends = self.backends.write().await;
        let mut changed = false;

        let mut previous: Vec<ManagedBackend> = backends.drain(..).collect();
        let mut next = Vec::with_capacity(configs.len());

        for config in configs {
            match previous.iter().position(|b| b.config.name == config.name) {
                Some(pos) => {
                    let mut managed = previous.remove(pos);
                    if managed.config != config {
                        changed = true;
                        let mut handle = managed.handle.lock().await;
                        if managed.reported == Some(true) {
                            self.hub.backend_status_changed(&config.name, false);
                        }
                        handle.replace_endpoints(config.endpoints()).await;
                        drop(handle);
                        managed.reported = Some(false);
                        managed.config = config;
                    }
                    next.push(managed);
                }
                None => {
                    changed = true;
                    info!(backend = %config.name, "Adding backend");
                    next.push(ManagedBackend::new(config, self.settings));
                }
            }
        }

        for removed in previous {
            changed = true;
            info!(backend = %removed.config.name, "Removing backend");
            removed.handle.lock().await.teardown().await;
        }

        *backends = next;
        if changed {
            self.all_ready.store(false, Ordering::SeqCst);
            self.refresh_ready_gauge(&backends).await;
        }
        changed
    }

    async fn refresh_ready_gauge(&self, backends: &[ManagedBackend]) {
        let mut ready = 0;
        for managed in backends {
            if managed.handle.lock().await.is_ready() {
                ready += 1;
            }
        }
        self.metrics.set_backends_ready(ready);
    }
}
