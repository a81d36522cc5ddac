//! Configuration Manager

use super::{BackendConfig, Config};
use crate::error::ControlError;
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(interval) = std::env::var("BACKEND_CONTROL_POLL_INTERVAL") {
            config.supervisor.poll_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid BACKEND_CONTROL_POLL_INTERVAL: {}", interval))?;
        }

        if let Ok(timeout) = std::env::var("BACKEND_CONTROL_CONNECT_TIMEOUT") {
            config.supervisor.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid BACKEND_CONTROL_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(cooldown) = std::env::var("BACKEND_CONTROL_EVENT_COOLDOWN") {
            config.commands.event_cooldown = humantime::parse_duration(&cooldown)
                .with_context(|| format!("Invalid BACKEND_CONTROL_EVENT_COOLDOWN: {}", cooldown))?;
        }

        if let Ok(hosts) = std::env::var("BACKEND_CONTROL_HOSTS") {
            let overrides = parse_host_overrides(hosts.split(';'))
                .with_context(|| format!("Invalid BACKEND_CONTROL_HOSTS: {}", hosts))?;
            config.apply_host_overrides(&overrides)?;
        }

        if let Ok(addr) = std::env::var("BACKEND_CONTROL_MANAGEMENT_ADDR") {
            config.management.bind_addr = addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid BACKEND_CONTROL_MANAGEMENT_ADDR: {}", addr))?;
            config.management.enabled = true;
        }

        if let Ok(api_key) = std::env::var("BACKEND_CONTROL_API_KEY") {
            config.management.auth.enabled = true;
            config.management.auth.api_key = Some(api_key);
        }

        if let Ok(log_level) = std::env::var("BACKEND_CONTROL_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse `NAME=HOST` pairs
pub fn parse_host_overrides<'a, I>(pairs: I) -> Result<Vec<(String, String)>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut overrides = Vec::new();
    for pair in pairs {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, host)) = pair.split_once('=') else {
            bail!("Expected NAME=HOST, got '{}'", pair);
        };
        overrides.push((name.trim().to_string(), host.trim().to_string()));
    }
    Ok(overrides)
}

/// Validate a full backend set; the whole set is rejected on the first problem
pub fn validate_backends(backends: &[BackendConfig]) -> std::result::Result<(), ControlError> {
    if backends.is_empty() {
        return Err(ControlError::Config(
            "at least one backend must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for (i, backend) in backends.iter().enumerate() {
        if backend.name.trim().is_empty() {
            return Err(ControlError::Config(format!("Backend {} has empty name", i)));
        }
        if !names.insert(backend.name.as_str()) {
            return Err(ControlError::Config(format!(
                "Duplicate backend name: {}",
                backend.name
            )));
        }
        if backend.host.trim().is_empty() {
            return Err(ControlError::Config(format!(
                "{}: IP address cannot be empty",
                backend.name
            )));
        }
        if backend.ports.is_empty() {
            return Err(ControlError::Config(format!(
                "{}: at least one port is required",
                backend.name
            )));
        }
        if backend.ports.contains(&0) {
            return Err(ControlError::Config(format!(
                "{}: port 0 is not a valid endpoint",
                backend.name
            )));
        }
    }

    Ok(())
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_supervisor_config()
            .with_context(|| "Supervisor configuration validation failed")?;

        validate_backends(&self.backends)
            .with_context(|| "Backend configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        self.validate_management_config()
            .with_context(|| "Management API configuration validation failed")?;

        Ok(())
    }

    fn validate_supervisor_config(&self) -> Result<()> {
        if self.supervisor.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.supervisor.poll_interval > Duration::from_secs(3600) {
            bail!("poll_interval cannot exceed 1 hour");
        }

        if self.supervisor.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.supervisor.connect_timeout > Duration::from_secs(60) {
            bail!("connect_timeout cannot exceed 60 seconds");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    fn validate_management_config(&self) -> Result<()> {
        let auth = &self.management.auth;
        if auth.enabled && auth.api_key.as_deref().map_or(true, str::is_empty) {
            bail!("management.auth.api_key is required when authentication is enabled");
        }

        Ok(())
    }

    /// Replace the host of each named backend
    pub fn apply_host_overrides(&mut self, overrides: &[(String, String)]) -> Result<()> {
        for (name, host) in overrides {
            let Some(backend) = self.backends.iter_mut().find(|b| &b.name == name) else {
                bail!("Unknown backend: {}", name);
            };
            backend.host = host.clone();
        }
        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        backend_hosts: &[(String, String)],
        poll_interval: Option<Duration>,
        connect_timeout: Option<Duration>,
        management_addr: Option<SocketAddr>,
        log_level: Option<&str>,
    ) -> Result<()> {
        if !backend_hosts.is_empty() {
            self.apply_host_overrides(backend_hosts)?;
            for (name, host) in backend_hosts {
                tracing::info!("CLI override: {} host set to {}", name, host);
            }
        }

        if let Some(interval) = poll_interval {
            self.supervisor.poll_interval = interval;
            tracing::info!("CLI override: poll interval set to {:?}", interval);
        }

        if let Some(timeout) = connect_timeout {
            self.supervisor.connect_timeout = timeout;
            tracing::info!("CLI override: connect timeout set to {:?}", timeout);
        }

        if let Some(addr) = management_addr {
            self.management.enabled = true;
            self.management.bind_addr = addr;
            tracing::info!("CLI override: management API enabled on {}", addr);
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].ports, vec![9090, 9091]);
        assert_eq!(config.backends[1].ports, vec![9092, 9093]);
        assert_eq!(config.supervisor.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_blank_host_rejected() {
        let mut backends = crate::config::default_backends();
        backends[1].host = "   ".to_string();

        match validate_backends(&backends) {
            Err(ControlError::Config(message)) => {
                assert_eq!(message, "Backend 2: IP address cannot be empty")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let backends = vec![
            BackendConfig::new("Backend 1", "localhost", vec![9090]),
            BackendConfig::new("Backend 1", "localhost", vec![9091]),
        ];
        assert!(matches!(
            validate_backends(&backends),
            Err(ControlError::Config(_))
        ));
    }

    #[test]
    fn test_zero_port_and_empty_ports_rejected() {
        let empty = vec![BackendConfig::new("Backend 1", "localhost", vec![])];
        assert!(validate_backends(&empty).is_err());

        let zero = vec![BackendConfig::new("Backend 1", "localhost", vec![0])];
        assert!(validate_backends(&zero).is_err());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[supervisor]
poll_interval = "250ms"

[[backends]]
name = "Recorder"
host = "10.0.0.5"
ports = [7000, 7001, 7002]
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.supervisor.poll_interval, Duration::from_millis(250));
        assert_eq!(config.supervisor.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].endpoints().len(), 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[backends]]
name = "Backend 1"
host = ""
ports = [9090]
"#
        )
        .unwrap();

        assert!(ConfigManager::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_parse_host_overrides() {
        let overrides = parse_host_overrides(["Backend 1=10.0.0.1", " Backend 2 = 10.0.0.2 ", ""]).unwrap();
        assert_eq!(
            overrides,
            vec![
                ("Backend 1".to_string(), "10.0.0.1".to_string()),
                ("Backend 2".to_string(), "10.0.0.2".to_string()),
            ]
        );
        assert!(parse_host_overrides(["no-separator"]).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config
            .merge_with_cli_args(
                &[("Backend 2".to_string(), "192.168.1.20".to_string())],
                Some(Duration::from_millis(200)),
                None,
                Some("127.0.0.1:9999".parse().unwrap()),
                Some("debug"),
            )
            .unwrap();

        assert_eq!(config.backends[1].host, "192.168.1.20");
        assert_eq!(config.supervisor.poll_interval, Duration::from_millis(200));
        assert!(config.management.enabled);
        assert_eq!(config.logging.level, "debug");

        let unknown = config.merge_with_cli_args(
            &[("Backend 9".to_string(), "x".to_string())],
            None,
            None,
            None,
            None,
        );
        assert!(unknown.is_err());
    }
}
