//! Control Error Taxonomy
//!
//! Typed failures returned by sessions, backends, the supervisor and the
//! command dispatcher. Callers match on the variant; nothing here is only
//! meant to be logged.

use crate::connection::Endpoint;
use thiserror::Error;

/// Errors produced by the connection core
#[derive(Debug, Error)]
pub enum ControlError {
    /// Socket creation, resolution, refusal, unreachable host or connect timeout
    #[error("Connect to {endpoint} failed: {reason}")]
    Connect { endpoint: Endpoint, reason: String },

    /// Handshake reply mismatch, malformed frame or receive timeout
    #[error("Protocol error on {endpoint}: {reason}")]
    Protocol { endpoint: Endpoint, reason: String },

    /// Send/receive failure after the handshake completed
    #[error("I/O error on {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// Rejected configuration input; nothing was applied
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request is not permitted in the current state
    #[error("Not allowed: {0}")]
    NotAllowed(String),
}

impl ControlError {
    pub fn connect(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        ControlError::Connect {
            endpoint: endpoint.clone(),
            reason: reason.into(),
        }
    }

    pub fn protocol(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        ControlError::Protocol {
            endpoint: endpoint.clone(),
            reason: reason.into(),
        }
    }

    pub fn io(endpoint: &Endpoint, source: std::io::Error) -> Self {
        ControlError::Io {
            endpoint: endpoint.clone(),
            source,
        }
    }

    /// Endpoint the failure happened on, if it is tied to one
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            ControlError::Connect { endpoint, .. }
            | ControlError::Protocol { endpoint, .. }
            | ControlError::Io { endpoint, .. } => Some(endpoint),
            ControlError::Config(_) | ControlError::NotAllowed(_) => None,
        }
    }
}
