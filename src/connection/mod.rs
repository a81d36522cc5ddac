//! Connection Management Module
//!
//! Socket sessions, backend handles and the supervisor that drives them to
//! readiness.

pub mod backend;
pub mod session;
pub mod supervisor;
pub mod types;

pub use backend::BackendHandle;
pub use session::SocketSession;
pub use supervisor::ConnectionSupervisor;
pub use types::*;
