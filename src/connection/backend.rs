//! Backend Handle
//!
//! Owns the socket sessions of one logical backend and runs the two-phase
//! handshake across all of them. Readiness is all-or-nothing: phase two
//! starts only once every endpoint finished phase one, and a phase-two
//! failure on any endpoint rolls back the whole backend.

use super::{BackendStatus, Endpoint, ReconcileResult, SessionSettings, SessionState, SocketSession};
use crate::error::ControlError;
use crate::protocol::Command;
use tracing::{debug, info, warn};

/// One logical backend and its sessions, one slot per endpoint
#[derive(Debug)]
pub struct BackendHandle {
    name: String,
    endpoints: Vec<Endpoint>,
    sessions: Vec<Option<SocketSession>>,
    ready: bool,
    settings: SessionSettings,
}

impl BackendHandle {
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>, settings: SessionSettings) -> Self {
        let sessions = endpoints.iter().map(|_| None).collect();
        Self {
            name: name.into(),
            endpoints,
            sessions,
            ready: false,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of slots currently holding a session
    pub fn open_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_some()).count()
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name.clone(),
            ready: self.ready,
            endpoints: self.endpoints.clone(),
            sessions: self
                .sessions
                .iter()
                .map(|s| s.as_ref().map_or(SessionState::Disconnected, |s| s.state()))
                .collect(),
        }
    }

    /// Try to bring every endpoint to a completed handshake
    pub async fn reconcile(&mut self) -> ReconcileResult {
        let mut result = ReconcileResult::default();
        if self.ready {
            result.ready = true;
            return result;
        }

        // Phase one, per endpoint that has no session yet
        for (endpoint, slot) in self.endpoints.iter().zip(self.sessions.iter_mut()) {
            if slot.is_some() {
                continue;
            }

            result.connect_attempts += 1;
            let mut session = match SocketSession::open(endpoint, self.settings).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(backend = %self.name, "{}", e);
                    result.connect_failures += 1;
                    result.just_failed.push(endpoint.clone());
                    continue;
                }
            };

            match session.handshake_phase_one().await {
                Ok(()) => *slot = Some(session),
                Err(e) => {
                    warn!(backend = %self.name, "{}", e);
                    session.close().await;
                    result.handshake_failures += 1;
                    result.just_failed.push(endpoint.clone());
                }
            }
        }

        if self.sessions.iter().any(|s| s.is_none()) {
            debug!(
                backend = %self.name,
                open = self.open_sessions(),
                total = self.endpoints.len(),
                "Backend not ready this cycle"
            );
            return result;
        }

        // Phase two, only once every sibling finished phase one
        let mut phase_two_failure = None;
        for session in self.sessions.iter_mut().flatten() {
            if let Err(e) = session.handshake_phase_two().await {
                phase_two_failure = Some(e);
                break;
            }
        }

        if let Some(e) = phase_two_failure {
            warn!(backend = %self.name, "Second handshake phase failed, resetting backend: {}", e);
            result.handshake_failures += 1;
            if let Some(endpoint) = e.endpoint() {
                result.just_failed.push(endpoint.clone());
            }
            self.close_sessions().await;
            return result;
        }

        self.ready = true;
        result.ready = true;
        info!(backend = %self.name, endpoints = self.endpoints.len(), "Backend ready");
        result
    }

    /// Close every session and mark the backend not ready
    pub async fn teardown(&mut self) {
        if self.ready || self.open_sessions() > 0 {
            info!(backend = %self.name, "Tearing down backend sessions");
        }
        self.close_sessions().await;
    }

    /// Replace the endpoint list; existing sessions are torn down first
    pub async fn replace_endpoints(&mut self, endpoints: Vec<Endpoint>) {
        self.teardown().await;
        self.sessions = endpoints.iter().map(|_| None).collect();
        self.endpoints = endpoints;
    }

    /// Deliver `command` on every session of this backend
    ///
    /// A session whose send fails is discarded, so every later send on this
    /// backend fails too until a teardown reconnects it.
    pub async fn send_all(&mut self, command: &Command) -> Result<(), ControlError> {
        if !self.ready {
            return Err(ControlError::NotAllowed(format!(
                "{} is not ready",
                self.name
            )));
        }

        let mut first_error = None;
        for session in self.sessions.iter_mut().flatten() {
            let frame = command.to_frame(session.take_sequence());
            if let Err(e) = session.send(&frame).await {
                warn!(backend = %self.name, command = %command, "Send failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(backend = %self.name, command = %command, "Command delivered");
                Ok(())
            }
        }
    }

    async fn close_sessions(&mut self) {
        for slot in self.sessions.iter_mut() {
            if let Some(mut session) = slot.take() {
                session.close().await;
            }
        }
        self.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_leave_backend_not_ready() {
        let endpoints = vec![
            Endpoint::new("127.0.0.1", closed_port().await),
            Endpoint::new("127.0.0.1", closed_port().await),
        ];
        let mut backend = BackendHandle::new("Backend 1", endpoints.clone(), SessionSettings::default());

        let result = backend.reconcile().await;
        assert!(!result.ready);
        assert_eq!(result.just_failed, endpoints);
        assert_eq!(result.connect_attempts, 2);
        assert_eq!(result.connect_failures, 2);
        assert!(!backend.is_ready());
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_teardown_twice_is_noop() {
        let endpoints = vec![Endpoint::new("127.0.0.1", closed_port().await)];
        let mut backend = BackendHandle::new("Backend 1", endpoints, SessionSettings::default());

        backend.teardown().await;
        backend.teardown().await;
        assert!(!backend.is_ready());
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_send_all_requires_ready() {
        let endpoints = vec![Endpoint::new("127.0.0.1", closed_port().await)];
        let mut backend = BackendHandle::new("Backend 1", endpoints, SessionSettings::default());

        let err = backend.send_all(&Command::Start).await.unwrap_err();
        assert!(matches!(err, ControlError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_status_reports_disconnected_slots() {
        let endpoints = vec![Endpoint::new("localhost", 9090), Endpoint::new("localhost", 9091)];
        let backend = BackendHandle::new("Backend 1", endpoints, SessionSettings::default());

        let status = backend.status();
        assert_eq!(status.name, "Backend 1");
        assert!(!status.ready);
        assert_eq!(status.sessions, vec![SessionState::Disconnected; 2]);
    }
}
