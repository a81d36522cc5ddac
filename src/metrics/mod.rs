//! Metrics Module
//!
//! Prometheus counters for reconciliation and command dispatch.

pub mod collector;

pub use collector::Metrics;
