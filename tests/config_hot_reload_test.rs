//! Configuration Hot-Reload Integration Tests

mod common;

use anyhow::Result;
use backend_control::config::{ConfigManager, ConfigReloadService};
use backend_control::connection::{ConnectionSupervisor, SessionSettings};
use backend_control::metrics::Metrics;
use common::MockBackend;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

fn config_text(host: &str, ports: &[u16]) -> String {
    let ports = ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
[supervisor]
poll_interval = "50ms"
hot_reload = true

[[backends]]
name = "Backend 1"
host = "{host}"
ports = [{ports}]
"#
    )
}

async fn wait_for_ports(supervisor: &ConnectionSupervisor, ports: &[u16]) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if supervisor.backend_configs().await[0].ports == ports {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_config_change_reconfigures_backends() -> Result<()> {
    let first = MockBackend::normal(1).await;
    let second = MockBackend::normal(2).await;

    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("backend-control.toml");
    fs::write(&config_path, config_text("127.0.0.1", &first.ports))?;

    let config = ConfigManager::load_from_file(&config_path)?;
    let supervisor = ConnectionSupervisor::new(
        config.backends.clone(),
        SessionSettings::new(config.supervisor.connect_timeout),
        Arc::new(Metrics::new()?),
    )?;
    assert!(supervisor.tick().await);

    let reload = ConfigReloadService::new(config_path.clone())?.start(supervisor.clone());
    fs::write(&config_path, config_text("127.0.0.1", &second.ports))?;

    assert!(wait_for_ports(&supervisor, &second.ports).await);
    assert!(!supervisor.is_all_ready());
    assert!(supervisor.tick().await);
    assert_eq!(second.connections(), 2);

    reload.abort();
    Ok(())
}

#[tokio::test]
async fn test_invalid_change_is_ignored() -> Result<()> {
    let backend = MockBackend::normal(1).await;

    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("backend-control.toml");
    fs::write(&config_path, config_text("127.0.0.1", &backend.ports))?;

    let config = ConfigManager::load_from_file(&config_path)?;
    let supervisor = ConnectionSupervisor::new(
        config.backends.clone(),
        SessionSettings::default(),
        Arc::new(Metrics::new()?),
    )?;
    assert!(supervisor.tick().await);

    let reload = ConfigReloadService::new(config_path.clone())?.start(supervisor.clone());
    fs::write(&config_path, config_text("", &backend.ports))?;
    sleep(Duration::from_millis(500)).await;

    assert!(supervisor.is_all_ready());
    assert_eq!(supervisor.backend_configs().await[0].host, "127.0.0.1");

    reload.abort();
    Ok(())
}

#[tokio::test]
async fn test_reload_reapplies_cli_host_override() -> Result<()> {
    let first = MockBackend::normal(1).await;
    let second = MockBackend::normal(2).await;

    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("backend-control.toml");
    fs::write(&config_path, config_text("10.9.9.9", &first.ports))?;

    let overrides = vec![("Backend 1".to_string(), "127.0.0.1".to_string())];
    let mut config = ConfigManager::load_from_file(&config_path)?;
    config.apply_host_overrides(&overrides)?;
    let supervisor = ConnectionSupervisor::new(
        config.backends.clone(),
        SessionSettings::default(),
        Arc::new(Metrics::new()?),
    )?;
    assert!(supervisor.tick().await);

    let reload = ConfigReloadService::new(config_path.clone())?
        .with_host_overrides(overrides)
        .start(supervisor.clone());
    fs::write(&config_path, config_text("10.9.9.9", &second.ports))?;

    assert!(wait_for_ports(&supervisor, &second.ports).await);
    assert_eq!(supervisor.backend_configs().await[0].host, "127.0.0.1");
    assert!(supervisor.tick().await);

    reload.abort();
    Ok(())
}
