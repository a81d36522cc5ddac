//! Connection Types

use crate::protocol::RECEIVE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single (host, port) pair that one socket session connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of one socket session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// HELLO/HELLO_ACK exchanged, waiting for siblings
    PhaseOneDone,
    HandshakeDone,
    Failed,
}

/// Timeouts applied to every session of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub receive_timeout: Duration,
}

impl SessionSettings {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            receive_timeout: RECEIVE_TIMEOUT,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(RECEIVE_TIMEOUT)
    }
}

/// Outcome of one reconciliation attempt on a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub ready: bool,
    /// Endpoints whose connect or handshake failed during this attempt
    pub just_failed: Vec<Endpoint>,
    pub connect_attempts: usize,
    pub connect_failures: usize,
    pub handshake_failures: usize,
}

/// Point-in-time view of a backend, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub ready: bool,
    pub endpoints: Vec<Endpoint>,
    pub sessions: Vec<SessionState>,
}
