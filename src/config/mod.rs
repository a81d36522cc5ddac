//! Configuration Module
//!
//! Handles configuration loading, validation, and hot reload.

pub mod manager;
pub mod types;
pub mod watcher;

pub use manager::{parse_host_overrides, validate_backends, ConfigManager};
pub use types::*;
pub use watcher::{ConfigChangeEvent, ConfigReloadService, ConfigWatcher};
