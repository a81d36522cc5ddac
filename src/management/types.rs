//! Management API Types

use crate::config::HostUpdate;
use crate::connection::BackendStatus;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Overall readiness and toggle state
#[derive(Debug, Serialize)]
pub struct ControlStatus {
    pub uptime_seconds: u64,
    pub version: String,
    pub all_ready: bool,
    pub is_running: bool,
    pub polling: bool,
    pub reconcile_ticks: u64,
    pub backends: Vec<BackendStatus>,
}

/// Host changes for named backends
#[derive(Debug, Deserialize)]
pub struct UpdateHostsRequest {
    pub hosts: Vec<HostUpdate>,
}

#[derive(Debug, Serialize)]
pub struct UpdateHostsResult {
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub payload: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: SystemTime,
}

/// API authentication configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
}
