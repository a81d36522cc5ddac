//! Command Dispatcher
//!
//! Sends START, END and EVENT frames to every backend and tracks whether
//! the system is running. A failed START is followed by a best-effort
//! `CONNECTION_FAIL` naming the backends that failed; a failed END is
//! reported to the caller only.

use crate::connection::ConnectionSupervisor;
use crate::error::ControlError;
use crate::protocol::Command;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Per-call result of a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub success: bool,
    /// Failed backend names, in configuration order
    pub failed_backends: Vec<String>,
}

impl DispatchOutcome {
    fn from_failures(failed_backends: Vec<String>) -> Self {
        Self {
            success: failed_backends.is_empty(),
            failed_backends,
        }
    }
}

#[derive(Debug, Default)]
struct ToggleState {
    is_running: bool,
    last_event: Option<Instant>,
}

pub struct CommandDispatcher {
    supervisor: ConnectionSupervisor,
    state: Mutex<ToggleState>,
    event_cooldown: Duration,
}

impl CommandDispatcher {
    pub fn new(supervisor: ConnectionSupervisor, event_cooldown: Duration) -> Self {
        Self {
            supervisor,
            state: Mutex::new(ToggleState::default()),
            event_cooldown,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running
    }

    /// Deliver `command` to every backend; backends that are not ready count as failed
    pub async fn send_to_all(&self, command: &Command) -> DispatchOutcome {
        let metrics = self.supervisor.metrics();
        let mut failed = Vec::new();

        for (name, handle) in self.supervisor.backend_handles().await {
            let result = handle.lock().await.send_all(command).await;
            metrics.record_command(command, result.is_ok());
            if let Err(e) = result {
                warn!(backend = %name, command = %command, "Command not delivered: {}", e);
                failed.push(name);
            }
        }

        DispatchOutcome::from_failures(failed)
    }

    /// Send START; on failure notify every backend of the ones that failed
    pub async fn toggle_start(&self) -> Result<DispatchOutcome, ControlError> {
        let mut state = self.state.lock().await;
        if state.is_running {
            return Err(ControlError::NotAllowed("already running".to_string()));
        }
        let outcome = self.send_to_all(&Command::Start).await;
        if outcome.success {
            state.is_running = true;
            info!("Start command delivered to every backend");
        } else {
            warn!(failed = ?outcome.failed_backends, "Start command failed");
            let notice = Command::ConnectionFail(outcome.failed_backends.clone());
            // Best effort
            let _ = self.send_to_all(&notice).await;
        }
        Ok(outcome)
    }

    /// Send END; state only changes when every backend acknowledged it
    pub async fn toggle_end(&self) -> Result<DispatchOutcome, ControlError> {
        let mut state = self.state.lock().await;
        let outcome = self.send_to_all(&Command::End).await;
        if outcome.success {
            state.is_running = false;
            info!("End command delivered to every backend");
        } else {
            warn!(failed = ?outcome.failed_backends, "End command failed");
        }
        Ok(outcome)
    }

    /// START when idle, END when running
    pub async fn toggle(&self) -> Result<DispatchOutcome, ControlError> {
        if self.is_running().await {
            self.toggle_end().await
        } else {
            self.toggle_start().await
        }
    }

    /// Send one event frame to every backend
    pub async fn send_event(&self, payload: &str) -> Result<DispatchOutcome, ControlError> {
        let mut state = self.state.lock().await;
        if state.is_running {
            return Err(ControlError::NotAllowed(
                "events cannot be sent while running".to_string(),
            ));
        }
        if let Some(last) = state.last_event {
            let elapsed = last.elapsed();
            if elapsed < self.event_cooldown {
                return Err(ControlError::NotAllowed(format!(
                    "event cooldown active for another {:?}",
                    self.event_cooldown - elapsed
                )));
            }
        }

        state.last_event = Some(Instant::now());
        let outcome = self.send_to_all(&Command::Event(payload.to_string())).await;
        if !outcome.success {
            warn!(failed = ?outcome.failed_backends, "Event not delivered everywhere");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::connection::SessionSettings;
    use crate::metrics::Metrics;
    use std::sync::Arc;

    fn dispatcher(cooldown: Duration) -> CommandDispatcher {
        let metrics = Arc::new(Metrics::new().unwrap());
        let supervisor = ConnectionSupervisor::new(
            vec![
                BackendConfig::new("Backend 1", "127.0.0.1", vec![1]),
                BackendConfig::new("Backend 2", "127.0.0.1", vec![2]),
            ],
            SessionSettings::default(),
            metrics,
        )
        .unwrap();
        CommandDispatcher::new(supervisor, cooldown)
    }

    #[tokio::test]
    async fn test_send_to_all_reports_unready_backends_in_order() {
        let dispatcher = dispatcher(Duration::ZERO);
        let outcome = dispatcher.send_to_all(&Command::Start).await;

        assert!(!outcome.success);
        assert_eq!(outcome.failed_backends, vec!["Backend 1", "Backend 2"]);
    }

    #[tokio::test]
    async fn test_toggle_start_with_unready_backends_fails_by_name() {
        let dispatcher = dispatcher(Duration::ZERO);
        let outcome = dispatcher.toggle_start().await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.failed_backends, vec!["Backend 1", "Backend 2"]);
        assert!(!dispatcher.is_running().await);
        // START and the CONNECTION_FAIL notice both count as failed sends
        let metrics = dispatcher.supervisor.metrics();
        assert_eq!(metrics.get_command_failures(&Command::Start), 2);
    }

    #[tokio::test]
    async fn test_failed_end_leaves_state_unchanged() {
        let dispatcher = dispatcher(Duration::ZERO);
        let outcome = dispatcher.toggle_end().await.unwrap();

        assert!(!outcome.success);
        assert!(!dispatcher.is_running().await);
        assert_eq!(
            dispatcher
                .supervisor
                .metrics()
                .get_command_failures(&Command::End),
            2
        );
    }

    #[tokio::test]
    async fn test_event_cooldown() {
        let dispatcher = dispatcher(Duration::from_secs(60));

        let first = dispatcher.send_event("marker").await.unwrap();
        assert!(!first.success);

        let second = dispatcher.send_event("marker").await;
        assert!(matches!(second, Err(ControlError::NotAllowed(_))));
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome = DispatchOutcome::from_failures(vec!["Backend 2".to_string()]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["failed_backends"][0], "Backend 2");
    }
}
