//! Metrics definitions for the signal relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event`: 4 values (client event names)
//! - `reason`: 3 values (`RelayError::reason_label`)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling happens in-process; anything above 100ms is a stall
        .set_buckets_for_metric(
            Matcher::Prefix("relay_event".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Metric: `relay_connections_active`
pub fn set_connections_active(count: usize) {
    // usize to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_connections_active").set(count as f64);
}

/// Metric: `relay_participants_active`
///
/// Participants across all rooms.
pub fn set_participants_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_participants_active").set(count as f64);
}

/// Metric: `relay_actor_mailbox_depth`
pub fn set_actor_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_actor_mailbox_depth").set(depth as f64);
}

/// Record a client event applied by the relay.
///
/// Metric: `relay_events_total`
/// Labels: `event`
pub fn record_event(event: &'static str) {
    counter!("relay_events_total", "event" => event).increment(1);
}

/// Record time from frame receipt to fan-out completion.
///
/// Metric: `relay_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &'static str, duration: Duration) {
    histogram!("relay_event_latency_seconds", "event" => event).record(duration.as_secs_f64());
}

/// Record a rejected client frame.
///
/// Metric: `relay_events_rejected_total`
/// Labels: `reason`
pub fn record_event_rejected(reason: &'static str) {
    counter!("relay_events_rejected_total", "reason" => reason).increment(1);
}

/// Record an outbound frame dropped because a connection's queue was full.
///
/// Metric: `relay_frames_dropped_total`
///
/// Non-zero values mean some clients cannot keep up.
pub fn record_frame_dropped() {
    counter!("relay_frames_dropped_total").increment(1);
}
