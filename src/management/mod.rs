//! Management API Module
//!
//! HTTP control surface: status, host updates, start/end/event commands
//! and Prometheus metrics.

pub mod api;
pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ManagementApi;
pub use auth::ApiAuth;
pub use handlers::AppState;
pub use server::ManagementServer;
pub use types::*;
