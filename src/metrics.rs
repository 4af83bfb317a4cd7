//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Synchronous push and event publish outcomes (source side)
//! - Event subscriber throughput, reconnects and lag (replica side)
//! - Bulk sync runs
//! - Engine state and replica size
//! - Circuit breaker calls
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `platform_replication_`:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track durations in seconds
//!
//! No recorder is installed by this crate. Without one every call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Source side
// =============================================================================

/// Record a synchronous push attempt outcome (`delivered`, `failed`, `rejected`).
pub fn record_push(outcome: &'static str, duration: Duration) {
    counter!("platform_replication_push_total", "outcome" => outcome).increment(1);
    histogram!("platform_replication_push_duration_seconds").record(duration.as_secs_f64());
}

/// Record an event publish outcome (`published`, `failed`).
pub fn record_publish(topic: &str, outcome: &'static str) {
    counter!(
        "platform_replication_publish_total",
        "topic" => topic.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a Platform created at the source.
pub fn record_platform_created() {
    counter!("platform_replication_platforms_created_total").increment(1);
}

// =============================================================================
// Replica side
// =============================================================================

/// Record one channel read.
pub fn record_stream_read(topic: &str, events_count: usize, duration: Duration) {
    counter!("platform_replication_stream_reads_total", "topic" => topic.to_string()).increment(1);
    if events_count > 0 {
        counter!("platform_replication_stream_events_read_total", "topic" => topic.to_string())
            .increment(events_count as u64);
    }
    histogram!("platform_replication_stream_read_duration_seconds", "topic" => topic.to_string())
        .record(duration.as_secs_f64());
}

/// Record an event processed by the subscriber, labelled by outcome.
pub fn record_event_processed(outcome: &'static str, duration: Duration) {
    counter!("platform_replication_events_processed_total", "outcome" => outcome).increment(1);
    histogram!("platform_replication_event_processing_duration_seconds")
        .record(duration.as_secs_f64());
}

/// Record an ingest through the HTTP path (`inserted`, `unchanged`).
pub fn record_ingest(outcome: &'static str) {
    counter!("platform_replication_ingest_total", "outcome" => outcome).increment(1);
}

/// Record a subscriber (re)attach attempt.
pub fn record_subscriber_attach(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("platform_replication_subscriber_attach_total", "status" => status).increment(1);
}

/// Record that the subscriber dropped its channel after a transport error.
pub fn record_subscriber_reset() {
    counter!("platform_replication_subscriber_resets_total").increment(1);
}

/// Record replication lag in milliseconds, based on the stream entry id.
pub fn record_replication_lag_ms(topic: &str, lag_ms: u64) {
    gauge!("platform_replication_lag_ms", "topic" => topic.to_string()).set(lag_ms as f64);
}

/// Gauge for how far the subscriber's last ack trails the newest entry.
pub fn set_subscriber_lag_ms(topic: &str, lag_ms: u64) {
    gauge!("platform_replication_subscriber_lag_ms", "topic" => topic.to_string())
        .set(lag_ms as f64);
}

/// Record a finished bulk sync run.
pub fn record_bulk_sync(success: bool, fetched: usize, inserted: usize, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("platform_replication_bulk_sync_total", "status" => status).increment(1);
    counter!("platform_replication_bulk_sync_fetched_total").increment(fetched as u64);
    counter!("platform_replication_bulk_sync_inserted_total").increment(inserted as u64);
    histogram!("platform_replication_bulk_sync_duration_seconds").record(duration.as_secs_f64());
}

/// Gauge for the number of Platform records held by the replica.
pub fn set_replica_platforms(count: usize) {
    gauge!("platform_replication_replica_platforms").set(count as f64);
}

/// Gauge for engine state.
pub fn set_engine_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Syncing" => 1.0,
        "Running" => 2.0,
        "ShuttingDown" => 3.0,
        "Stopped" => 4.0,
        _ => -1.0,
    };
    gauge!("platform_replication_engine_state").set(value);
}

/// Record errors by component and [`ReplicationError::kind`](crate::error::ReplicationError::kind).
pub fn record_error(component: &'static str, kind: &'static str) {
    counter!(
        "platform_replication_errors_total",
        "component" => component,
        "kind" => kind
    )
    .increment(1);
}

// =============================================================================
// Circuit Breaker Metrics
// =============================================================================

/// Record circuit breaker call outcome.
pub fn record_circuit_call(circuit_name: &str, outcome: &'static str) {
    counter!(
        "platform_replication_circuit_calls_total",
        "circuit" => circuit_name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
