//! Metrics collection and export for the webchannel hub.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use webchannel_core::RegistryStats;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "webchannel_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "webchannel_sessions_active";
    pub const FRAMES_TOTAL: &str = "webchannel_frames_total";
    pub const FRAMES_BYTES: &str = "webchannel_frames_bytes";
    pub const CHANNELS_ACTIVE: &str = "webchannel_channels_active";
    pub const HANDLES_ACTIVE: &str = "webchannel_handles_active";
    pub const MESSAGES_ROUTED: &str = "webchannel_messages_routed_total";
    pub const LATENCY_SECONDS: &str = "webchannel_latency_seconds";
    pub const ERRORS_TOTAL: &str = "webchannel_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of hub sessions since start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of hub sessions");
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames processed");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of live channels");
    metrics::describe_gauge!(
        names::HANDLES_ACTIVE,
        "Current number of connection handles across all channels"
    );
    metrics::describe_counter!(
        names::MESSAGES_ROUTED,
        "Total number of messages routed, by mode"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new session.
pub fn record_session() {
    counter!(names::SESSIONS_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

/// Record a session ending.
pub fn record_session_end() {
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record a routed message.
pub fn record_routed(mode: &'static str) {
    counter!(names::MESSAGES_ROUTED, "mode" => mode).increment(1);
}

/// Record frame processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update channel and handle gauges from a registry snapshot.
pub fn set_registry_stats(stats: RegistryStats) {
    gauge!(names::CHANNELS_ACTIVE).set(stats.channel_count as f64);
    gauge!(names::HANDLES_ACTIVE).set(stats.connection_count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records the session end on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session.
    #[must_use]
    pub fn new() -> Self {
        record_session();
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        record_session_end();
    }
}
