//! Status Observers
//!
//! The control surface learns about readiness through this module, either
//! by registering a [`StatusObserver`] or by subscribing to the broadcast
//! stream of [`StatusEvent`]s.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Callbacks invoked by the connection supervisor
pub trait StatusObserver: Send + Sync {
    fn on_backend_status_changed(&self, name: &str, ready: bool);

    fn on_all_ready(&self);
}

/// Status change published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    BackendStatusChanged { name: String, ready: bool },
    AllReady,
}

/// Fans status changes out to observers and broadcast subscribers
pub struct StatusHub {
    observers: RwLock<Vec<Arc<dyn StatusObserver>>>,
    events_tx: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            observers: RwLock::new(Vec::new()),
            events_tx,
        }
    }

    pub fn register(&self, observer: Arc<dyn StatusObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }

    pub fn backend_status_changed(&self, name: &str, ready: bool) {
        for observer in self.snapshot() {
            observer.on_backend_status_changed(name, ready);
        }
        self.publish(StatusEvent::BackendStatusChanged {
            name: name.to_string(),
            ready,
        });
    }

    pub fn all_ready(&self) {
        for observer in self.snapshot() {
            observer.on_all_ready();
        }
        self.publish(StatusEvent::AllReady);
    }

    fn snapshot(&self) -> Vec<Arc<dyn StatusObserver>> {
        self.observers
            .read()
            .map(|observers| observers.clone())
            .unwrap_or_default()
    }

    fn publish(&self, event: StatusEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("No subscribers for status event");
        }
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that reports status changes through tracing
pub struct LoggingObserver;

impl StatusObserver for LoggingObserver {
    fn on_backend_status_changed(&self, name: &str, ready: bool) {
        tracing::info!(
            backend = name,
            "{}: {}",
            name,
            if ready { "Connected" } else { "Not Connected" }
        );
    }

    fn on_all_ready(&self) {
        tracing::info!("All backends connected successfully");
    }
}
