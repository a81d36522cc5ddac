//! backend-control
//!
//! Keeps the configured backends connected and exposes start/stop/event
//! control over an optional HTTP management API.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backend_control::{
    config::{parse_host_overrides, ConfigManager, ConfigReloadService},
    connection::SessionSettings,
    management::ManagementServer,
    metrics::Metrics,
    observer::LoggingObserver,
    CommandDispatcher, ConnectionSupervisor, ShutdownCoordinator,
};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "backend-control")]
#[command(about = "Connection manager and command dispatcher for remote backends")]
#[command(version)]
#[command(long_about = "
Keeps every configured backend connected through a two-phase handshake and
sends start, end and event commands to all of them.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  BACKEND_CONTROL_POLL_INTERVAL    - Reconciliation interval (e.g., 1s, 500ms)
  BACKEND_CONTROL_CONNECT_TIMEOUT  - Socket connect timeout
  BACKEND_CONTROL_EVENT_COOLDOWN   - Minimum gap between two events
  BACKEND_CONTROL_HOSTS            - Host overrides, NAME=HOST separated by ';'
  BACKEND_CONTROL_MANAGEMENT_ADDR  - Enable the management API on this address
  BACKEND_CONTROL_API_KEY          - Require this x-api-key on the management API
  BACKEND_CONTROL_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Backend host override, repeatable
    #[arg(long = "backend-host", value_name = "NAME=HOST", help = "Override the host of a named backend")]
    pub backend_hosts: Vec<String>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Reconciliation interval (e.g., 1s)")]
    pub poll_interval: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Socket connect timeout (e.g., 500ms)")]
    pub connect_timeout: Option<Duration>,

    /// Enable the management API on this address
    #[arg(long, help = "Management API bind address (e.g., 127.0.0.1:8080)")]
    pub management_addr: Option<SocketAddr>,

    /// Watch the configuration file and reconfigure on change
    #[arg(long, help = "Reload backends when the config file changes")]
    pub hot_reload: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    let backend_hosts = parse_host_overrides(args.backend_hosts.iter().map(String::as_str))
        .context("Invalid --backend-host value")?;
    config.merge_with_cli_args(
        &backend_hosts,
        args.poll_interval,
        args.connect_timeout,
        args.management_addr,
        args.log_level.as_deref(),
    )?;
    if args.hot_reload {
        config.supervisor.hot_reload = true;
    }

    init_tracing(&config.logging.level, args.verbose)?;

    info!("Starting backend-control v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Poll interval: {:?}", config.supervisor.poll_interval);
        info!("  Connect timeout: {:?}", config.supervisor.connect_timeout);
        for backend in &config.backends {
            info!(
                "  {}: {} ports {:?}",
                backend.name, backend.host, backend.ports
            );
        }
        info!(
            "  Management API: {}",
            if config.management.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    for backend in &config.backends {
        info!(
            backend = %backend.name,
            host = %backend.host,
            ports = ?backend.ports,
            "Configured backend"
        );
    }

    let shutdown_coordinator = ShutdownCoordinator::new(config.supervisor.shutdown_timeout);
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let supervisor = ConnectionSupervisor::new(
        config.backends.clone(),
        SessionSettings::new(config.supervisor.connect_timeout),
        metrics,
    )
    .context("Invalid backend configuration")?;
    supervisor.register_observer(Arc::new(LoggingObserver));

    let dispatcher = Arc::new(CommandDispatcher::new(
        supervisor.clone(),
        config.commands.event_cooldown,
    ));

    let reload_handle = if config.supervisor.hot_reload && args.config.exists() {
        let service = ConfigReloadService::new(args.config.clone())
            .context("Failed to start configuration watcher")?
            .with_host_overrides(backend_hosts.clone());
        Some(service.start(supervisor.clone()))
    } else {
        None
    };

    let management_handle = if config.management.enabled {
        let management_server = ManagementServer::new(
            config.management.bind_addr,
            supervisor.clone(),
            Arc::clone(&dispatcher),
            config.management.auth.clone(),
        );
        let mut shutdown_rx = shutdown_coordinator.subscribe();

        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
            };
            if let Err(e) = management_server.run(shutdown).await {
                error!("Management API server error: {:#}", e);
            }
        }))
    } else {
        info!("Management API server disabled");
        None
    };

    supervisor.start(config.supervisor.poll_interval);

    info!("backend-control started; press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");

    if let Some(handle) = reload_handle {
        handle.abort();
    }

    shutdown_coordinator.shutdown_supervisor(&supervisor).await?;

    if let Some(handle) = management_handle {
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("Management API task failed: {}", e);
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(level: &str, verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
