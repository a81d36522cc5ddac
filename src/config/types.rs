//! Configuration Types

use crate::connection::Endpoint;
use crate::management::types::ApiAuthConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub commands: CommandConfig,
    pub logging: LoggingConfig,
    pub management: ManagementApiConfig,
    pub backends: Vec<BackendConfig>,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Reconfigure backends when the config file changes on disk
    pub hot_reload: bool,
}

/// Command dispatch configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Minimum gap between two events; zero disables the cooldown
    #[serde(with = "humantime_serde")]
    pub event_cooldown: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Management API configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementApiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub auth: ApiAuthConfig,
}

/// One logical backend: a host and the ordered ports its sessions use
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    pub name: String,
    pub host: String,
    pub ports: Vec<u16>,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ports,
        }
    }

    /// Endpoints in port order, with the host trimmed
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let host = self.host.trim();
        self.ports
            .iter()
            .map(|&port| Endpoint::new(host, port))
            .collect()
    }
}

/// Host change for one named backend, as issued by the control surface
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostUpdate {
    pub name: String,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            commands: CommandConfig::default(),
            logging: LoggingConfig::default(),
            management: ManagementApiConfig::default(),
            backends: default_backends(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(5),
            hot_reload: false,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            event_cooldown: Duration::ZERO,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth: ApiAuthConfig::default(),
        }
    }
}

/// The sample deployment: two backends on localhost, two ports each
pub fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::new("Backend 1", "localhost", vec![9090, 9091]),
        BackendConfig::new("Backend 2", "localhost", vec![9092, 9093]),
    ]
}
