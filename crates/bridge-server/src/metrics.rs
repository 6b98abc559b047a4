//! Metrics collection and export for the LED bridge.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const BROKER_MESSAGES_TOTAL: &str = "ledbridge_broker_messages_total";
    pub const BROKER_MESSAGES_BYTES: &str = "ledbridge_broker_messages_bytes";
    pub const VIEWERS_TOTAL: &str = "ledbridge_viewers_total";
    pub const VIEWERS_ACTIVE: &str = "ledbridge_viewers_active";
    pub const PUSHES_TOTAL: &str = "ledbridge_pushes_total";
    pub const COMMANDS_TOTAL: &str = "ledbridge_commands_total";
    pub const ERRORS_TOTAL: &str = "ledbridge_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::BROKER_MESSAGES_TOTAL,
        "Broker messages processed, by outcome"
    );
    metrics::describe_counter!(
        names::BROKER_MESSAGES_BYTES,
        "Total bytes of broker messages processed"
    );
    metrics::describe_counter!(
        names::VIEWERS_TOTAL,
        "Total number of viewer connections since server start"
    );
    metrics::describe_gauge!(names::VIEWERS_ACTIVE, "Current number of connected viewers");
    metrics::describe_counter!(names::PUSHES_TOTAL, "Device snapshots pushed to viewers");
    metrics::describe_counter!(
        names::COMMANDS_TOTAL,
        "Commands routed to the broker, by kind and outcome"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a processed broker message.
pub fn record_broker_message(outcome: &'static str, bytes: usize) {
    counter!(names::BROKER_MESSAGES_TOTAL, "outcome" => outcome).increment(1);
    counter!(names::BROKER_MESSAGES_BYTES).increment(bytes as u64);
    if outcome == "dropped" {
        record_error("decode");
    }
}

/// Record a snapshot pushed to a viewer.
pub fn record_push() {
    counter!(names::PUSHES_TOTAL).increment(1);
}

/// Record a routed command.
pub fn record_command(kind: &'static str, outcome: &'static str) {
    counter!(names::COMMANDS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that tracks a viewer connection for its lifetime.
pub struct ViewerMetricsGuard;

impl ViewerMetricsGuard {
    /// Create a new metrics guard, recording a viewer connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::VIEWERS_TOTAL).increment(1);
        gauge!(names::VIEWERS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ViewerMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ViewerMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::VIEWERS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter() {
        // No recorder installed: every call is a no-op.
        let _guard = ViewerMetricsGuard::new();
        record_broker_message("dropped", 12);
        record_command("send_effect", "ok");
        record_push();
    }
}
