//! Backend Control Library
//!
//! Keeps a set of remote backends connected over a small framed TCP
//! protocol, drives each through a two-phase handshake and fans
//! start/stop/event commands out to all of them.

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod management;
pub mod metrics;
pub mod observer;
pub mod protocol;
pub mod shutdown;

pub use command::{CommandDispatcher, DispatchOutcome};
pub use config::Config;
pub use connection::ConnectionSupervisor;
pub use error::ControlError;
pub use shutdown::ShutdownCoordinator;

/// Common result type for application plumbing
pub type Result<T> = anyhow::Result<T>;
