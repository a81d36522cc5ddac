//! Command Dispatch Module
//!
//! Start/stop/event commands fanned out to every backend.

pub mod dispatcher;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
