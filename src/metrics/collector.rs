//! Metrics Collector

use crate::connection::ReconcileResult;
use crate::protocol::Command;
use crate::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

/// Prometheus counters for reconciliation and command dispatch
pub struct Metrics {
    prometheus_registry: Registry,

    reconcile_ticks_total: IntCounter,
    connect_attempts_total: IntCounter,
    connect_failures_total: IntCounter,
    handshake_failures_total: IntCounter,
    backends_ready: IntGauge,
    commands_sent_total: IntCounterVec,
    command_failures_total: IntCounterVec,
}

impl Metrics {
    /// Create and register every metric
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let reconcile_ticks_total = IntCounter::new(
            "backend_control_reconcile_ticks_total",
            "Reconciliation ticks executed by the supervisor",
        )?;
        let connect_attempts_total = IntCounter::new(
            "backend_control_connect_attempts_total",
            "Socket connect attempts to backend endpoints",
        )?;
        let connect_failures_total = IntCounter::new(
            "backend_control_connect_failures_total",
            "Socket connect attempts that failed",
        )?;
        let handshake_failures_total = IntCounter::new(
            "backend_control_handshake_failures_total",
            "Handshake exchanges that failed in either phase",
        )?;
        let backends_ready = IntGauge::new(
            "backend_control_backends_ready",
            "Backends whose sessions all completed the handshake",
        )?;
        let commands_sent_total = IntCounterVec::new(
            Opts::new(
                "backend_control_commands_sent_total",
                "Commands delivered to a backend",
            ),
            &["command"],
        )?;
        let command_failures_total = IntCounterVec::new(
            Opts::new(
                "backend_control_command_failures_total",
                "Commands a backend failed to acknowledge",
            ),
            &["command"],
        )?;

        prometheus_registry.register(Box::new(reconcile_ticks_total.clone()))?;
        prometheus_registry.register(Box::new(connect_attempts_total.clone()))?;
        prometheus_registry.register(Box::new(connect_failures_total.clone()))?;
        prometheus_registry.register(Box::new(handshake_failures_total.clone()))?;
        prometheus_registry.register(Box::new(backends_ready.clone()))?;
        prometheus_registry.register(Box::new(commands_sent_total.clone()))?;
        prometheus_registry.register(Box::new(command_failures_total.clone()))?;

        Ok(Self {
            prometheus_registry,
            reconcile_ticks_total,
            connect_attempts_total,
            connect_failures_total,
            handshake_failures_total,
            backends_ready,
            commands_sent_total,
            command_failures_total,
        })
    }

    pub fn record_tick(&self) {
        self.reconcile_ticks_total.inc();
    }

    /// Fold one backend's reconcile outcome into the counters
    pub fn record_reconcile(&self, result: &ReconcileResult) {
        self.connect_attempts_total.inc_by(result.connect_attempts as u64);
        self.connect_failures_total.inc_by(result.connect_failures as u64);
        self.handshake_failures_total.inc_by(result.handshake_failures as u64);
    }

    pub fn set_backends_ready(&self, count: usize) {
        self.backends_ready.set(count as i64);
    }

    pub fn record_command(&self, command: &Command, delivered: bool) {
        let label = command_label(command);
        if delivered {
            self.commands_sent_total.with_label_values(&[label]).inc();
        } else {
            self.command_failures_total.with_label_values(&[label]).inc();
        }
    }

    pub fn get_connect_attempts(&self) -> u64 {
        self.connect_attempts_total.get()
    }

    pub fn get_connect_failures(&self) -> u64 {
        self.connect_failures_total.get()
    }

    pub fn get_handshake_failures(&self) -> u64 {
        self.handshake_failures_total.get()
    }

    pub fn get_backends_ready(&self) -> i64 {
        self.backends_ready.get()
    }

    pub fn get_commands_sent(&self, command: &Command) -> u64 {
        self.commands_sent_total
            .with_label_values(&[command_label(command)])
            .get()
    }

    pub fn get_command_failures(&self, command: &Command) -> u64 {
        self.command_failures_total
            .with_label_values(&[command_label(command)])
            .get()
    }

    /// Export all metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Start => "start",
        Command::End => "end",
        Command::ConnectionFail(_) => "connection_fail",
        Command::Event(_) => "event",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Endpoint;

    #[test]
    fn test_reconcile_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile(&ReconcileResult {
            ready: false,
            just_failed: vec![Endpoint::new("localhost", 9091)],
            connect_attempts: 2,
            connect_failures: 1,
            handshake_failures: 0,
        });

        assert_eq!(metrics.get_connect_attempts(), 2);
        assert_eq!(metrics.get_connect_failures(), 1);
        assert_eq!(metrics.get_handshake_failures(), 0);
    }

    #[test]
    fn test_command_counters_by_label() {
        let metrics = Metrics::new().unwrap();
        metrics.record_command(&Command::Start, true);
        metrics.record_command(&Command::Start, false);
        metrics.record_command(&Command::Event("x".into()), true);

        assert_eq!(metrics.get_commands_sent(&Command::Start), 1);
        assert_eq!(metrics.get_command_failures(&Command::Start), 1);
        assert_eq!(metrics.get_commands_sent(&Command::Event(String::new())), 1);
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.set_backends_ready(2);
        metrics.record_command(&Command::End, true);

        let exported = metrics.export_prometheus();
        assert!(exported.contains("backend_control_backends_ready 2"));
        assert!(exported.contains("backend_control_commands_sent_total{command=\"end\"} 1"));
    }
}
