//! Configuration File Watcher
//!
//! Reloads the configuration file when it changes on disk and pushes the
//! new backend set into the supervisor.

use super::{BackendConfig, Config, ConfigManager};
use crate::connection::ConnectionSupervisor;
use crate::Result;
use anyhow::{bail, Context};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, error, info, warn};

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub config: Arc<Config>,
    pub timestamp: std::time::SystemTime,
    pub file_path: PathBuf,
}

/// Configuration file watcher
pub struct ConfigWatcher {
    config_path: PathBuf,
    current_config: Arc<RwLock<Arc<Config>>>,
    change_sender: broadcast::Sender<ConfigChangeEvent>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Create a new configuration watcher
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let (change_sender, _) = broadcast::channel(16);

        let initial_config = ConfigManager::load_from_file(&config_path)?;
        let current_config = Arc::new(RwLock::new(Arc::new(initial_config)));

        let sender_clone = change_sender.clone();
        let config_clone = current_config.clone();
        let path_clone = config_path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    Self::handle_file_event(event, &path_clone, &config_clone, &sender_clone)
                }
                Err(e) => error!("File watcher error: {}", e),
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        // Editors often replace the file, so watch the directory
        let Some(parent_dir) = config_path.parent() else {
            bail!(
                "Configuration file has no parent directory: {}",
                config_path.display()
            );
        };
        watcher
            .watch(parent_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent_dir.display()))?;
        info!(
            "Started watching configuration directory: {}",
            parent_dir.display()
        );

        Ok(Self {
            config_path,
            current_config,
            change_sender,
            _watcher: watcher,
        })
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        self.current_config
            .read()
            .map(|config| Arc::clone(&*config))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()))
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> BroadcastStream<ConfigChangeEvent> {
        BroadcastStream::new(self.change_sender.subscribe())
    }

    /// Force reload the configuration
    pub fn reload(&self) -> Result<()> {
        info!(
            "Force reloading configuration from: {}",
            self.config_path.display()
        );
        Self::reload_from(&self.config_path, &self.current_config, &self.change_sender)
    }

    fn handle_file_event(
        event: Event,
        config_path: &Path,
        current_config: &RwLock<Arc<Config>>,
        sender: &broadcast::Sender<ConfigChangeEvent>,
    ) {
        let affects_config = event
            .paths
            .iter()
            .any(|path| path.file_name() == config_path.file_name());
        if !affects_config {
            return;
        }

        match event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                info!("Configuration file changed, reloading...");

                // Give the writer a moment to finish
                std::thread::sleep(std::time::Duration::from_millis(100));

                if let Err(e) = Self::reload_from(config_path, current_config, sender) {
                    error!("Failed to reload configuration, keeping current config: {:#}", e);
                }
            }
            EventKind::Remove(_) => {
                warn!("Configuration file was removed: {}", config_path.display());
            }
            _ => {
                debug!("Ignoring file event type: {:?}", event.kind);
            }
        }
    }

    fn reload_from(
        config_path: &Path,
        current_config: &RwLock<Arc<Config>>,
        sender: &broadcast::Sender<ConfigChangeEvent>,
    ) -> Result<()> {
        let config = Arc::new(ConfigManager::load_from_file(config_path)?);

        {
            let mut current = current_config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if **current == *config {
                debug!("Configuration content unchanged");
                return Ok(());
            }
            *current = Arc::clone(&config);
        }

        let event = ConfigChangeEvent {
            config,
            timestamp: std::time::SystemTime::now(),
            file_path: config_path.to_path_buf(),
        };
        if sender.send(event).is_err() {
            warn!("No subscribers for config change event");
        }

        info!("Configuration reloaded successfully");
        Ok(())
    }
}

/// Feeds reloaded backend sets into the supervisor
pub struct ConfigReloadService {
    watcher: ConfigWatcher,
    host_overrides: Vec<(String, String)>,
}

impl ConfigReloadService {
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let watcher = ConfigWatcher::new(config_path)?;
        Ok(Self {
            watcher,
            host_overrides: Vec::new(),
        })
    }

    /// Host overrides from the command line, reapplied to every reload
    pub fn with_host_overrides(mut self, host_overrides: Vec<(String, String)>) -> Self {
        self.host_overrides = host_overrides;
        self
    }

    /// Backends of a reloaded configuration with the overrides applied
    pub fn effective_backends(&self, config: &Config) -> Result<Vec<BackendConfig>> {
        let mut config = config.clone();
        config
            .apply_host_overrides(&self.host_overrides)
            .context("Host override no longer matches the reloaded backends")?;
        Ok(config.backends)
    }

    /// Spawn the task applying every change to `supervisor`
    pub fn start(self, supervisor: ConnectionSupervisor) -> JoinHandle<()> {
        let mut change_stream = self.watcher.subscribe();

        info!("Configuration reload service started");
        tokio::spawn(async move {
            while let Some(change_event) = change_stream.next().await {
                match change_event {
                    Ok(event) => {
                        info!(
                            "Applying configuration change from: {}",
                            event.file_path.display()
                        );
                        let backends = match self.effective_backends(&event.config) {
                            Ok(backends) => backends,
                            Err(e) => {
                                error!("Ignoring reloaded configuration: {:#}", e);
                                continue;
                            }
                        };
                        match supervisor.reconfigure(backends).await {
                            Ok(true) => info!("Backends reconfigured"),
                            Ok(false) => debug!("Backend set unchanged"),
                            Err(e) => error!("Rejected reloaded backends: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Error receiving configuration change: {}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INITIAL: &str = r#"
[supervisor]
poll_interval = "1s"

[[backends]]
name = "Backend 1"
host = "127.0.0.1"
ports = [9090, 9091]
"#;

    #[tokio::test]
    async fn test_config_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("backend-control.toml");
        fs::write(&config_path, INITIAL).unwrap();

        let watcher = ConfigWatcher::new(config_path).unwrap();
        let config = watcher.get_config();
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].ports, vec![9090, 9091]);
    }

    #[tokio::test]
    async fn test_force_reload_publishes_change() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("backend-control.toml");
        fs::write(&config_path, INITIAL).unwrap();

        let watcher = ConfigWatcher::new(config_path.clone()).unwrap();
        let mut changes = watcher.subscribe();

        fs::write(&config_path, INITIAL.replace("127.0.0.1", "10.1.1.1")).unwrap();
        watcher.reload().unwrap();

        let event = changes.next().await.unwrap().unwrap();
        assert_eq!(event.config.backends[0].host, "10.1.1.1");
        assert_eq!(watcher.get_config().backends[0].host, "10.1.1.1");
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_current() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("backend-control.toml");
        fs::write(&config_path, INITIAL).unwrap();

        let watcher = ConfigWatcher::new(config_path.clone()).unwrap();
        fs::write(&config_path, INITIAL.replace("127.0.0.1", "")).unwrap();

        assert!(watcher.reload().is_err());
        assert_eq!(watcher.get_config().backends[0].host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_reload_keeps_host_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("backend-control.toml");
        fs::write(&config_path, INITIAL).unwrap();

        let service = ConfigReloadService::new(config_path)
            .unwrap()
            .with_host_overrides(vec![("Backend 1".to_string(), "192.168.1.20".to_string())]);

        let reloaded: Config = toml::from_str(&INITIAL.replace("9091", "9092")).unwrap();
        let backends = service.effective_backends(&reloaded).unwrap();
        assert_eq!(backends[0].host, "192.168.1.20");
        assert_eq!(backends[0].ports, vec![9090, 9092]);

        let renamed: Config = toml::from_str(&INITIAL.replace("Backend 1", "Recorder")).unwrap();
        assert!(service.effective_backends(&renamed).is_err());
    }
}
