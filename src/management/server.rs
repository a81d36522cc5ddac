//! Management API Server

use super::{api::ManagementApi, handlers::AppState, types::ApiAuthConfig};
use crate::command::CommandDispatcher;
use crate::connection::ConnectionSupervisor;
use crate::metrics::Metrics;
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Management API server
pub struct ManagementServer {
    bind_addr: SocketAddr,
    app_state: AppState,
    auth_config: ApiAuthConfig,
}

impl ManagementServer {
    pub fn new(
        bind_addr: SocketAddr,
        supervisor: ConnectionSupervisor,
        dispatcher: Arc<CommandDispatcher>,
        auth_config: ApiAuthConfig,
    ) -> Self {
        let metrics: Arc<Metrics> = Arc::clone(supervisor.metrics());
        let app_state = AppState {
            supervisor,
            dispatcher,
            metrics,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
            auth_config,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting management API server on {}", self.bind_addr);

        let app = self.router();
        let listener = TcpListener::bind(self.bind_addr).await.with_context(|| {
            format!(
                "Failed to bind management API server to {}",
                self.bind_addr
            )
        })?;

        info!("Management API server listening on {}", self.bind_addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Management API server error: {}", e);
            return Err(e.into());
        }

        info!("Management API server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        ManagementApi::create_router(self.app_state.clone(), self.auth_config.clone())
    }
}
