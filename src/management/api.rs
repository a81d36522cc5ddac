//! Management API Routes

use super::{
    auth::{auth_middleware, ApiAuth},
    handlers::*,
    types::ApiAuthConfig,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Management API router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the management API router
    pub fn create_router(state: AppState, auth_config: ApiAuthConfig) -> Router {
        let auth = Arc::new(ApiAuth::new(auth_config));

        let public_routes = Router::new().route("/health", get(health_check));

        let protected_routes = Router::new()
            .route("/status", get(get_status))
            .route("/config/hosts", put(update_hosts))
            .route("/control/start", post(control_start))
            .route("/control/end", post(control_end))
            .route("/control/toggle", post(control_toggle))
            .route("/control/event", post(control_event))
            .route("/metrics", get(get_metrics))
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
            .with_state(state);

        Router::new()
            .nest("/api/v1", public_routes.merge(protected_routes))
            .layer(CorsLayer::permissive())
    }
}
