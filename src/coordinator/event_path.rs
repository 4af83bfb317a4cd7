// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event path: the replica's subscriber loop.
//!
//! One dedicated task per replica that:
//! 1. Attaches to the event channel (consumer group join)
//! 2. Reads a batch of entries (blocking up to `block_timeout`)
//! 3. Hands each entry to the [`EventProcessor`] in arrival order
//! 4. Acks each entry once it has a final outcome
//!
//! # Failure Handling
//!
//! A read or ack error, or a store failure, resets the channel and
//! re-attaches with exponential backoff, forever. Entries that were
//! delivered but not acked are re-delivered after the re-attach, ahead
//! of anything new, so per-topic order holds.
//!
//! # Graceful Shutdown
//!
//! The shutdown signal interrupts a blocked read or a backoff sleep. A
//! batch already in hand is finished (processed and acked) first.
//! Anything still un-acked stays queued for the next start.

use super::types::SubscriberStats;
use crate::channel::{entry_age_ms, ChannelEntry, EventChannel};
use crate::config::SubscriberConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::processor::{EventProcessor, ProcessOutcome};
use crate::resilience::RetryConfig;
use crate::store::ReplicaStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Run the subscriber until shutdown is signaled.
pub(super) async fn run_subscriber<S: ReplicaStore, C: EventChannel>(
    channel: Arc<C>,
    processor: EventProcessor<S>,
    config: SubscriberConfig,
    backoff: RetryConfig,
    stats: Arc<SubscriberStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let topic = channel.topic().to_string();
    let span = info_span!("event_path", topic = %topic);

    async move {
        info!("Starting event subscriber");

        let block_timeout = config.block_timeout_duration();
        let batch_size = config.batch_size.max(1);
        let mut attached = false;
        let mut consecutive_errors = 0usize;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if !attached {
                let result = tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }

                    result = channel.attach() => result,
                };

                match result {
                    Ok(()) => {
                        attached = true;
                        stats.set_attached(true);
                        metrics::record_subscriber_attach(true);
                        info!(after_errors = consecutive_errors, "Attached to event channel");
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        metrics::record_subscriber_attach(false);
                        metrics::record_error("event_path", e.kind());
                        let delay = backoff.delay_for_attempt(consecutive_errors);
                        warn!(
                            error = %e,
                            consecutive_errors,
                            backoff_ms = delay.as_millis() as u64,
                            "Attach failed, backing off"
                        );
                        if sleep_or_shutdown(&mut shutdown_rx, delay).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let read_start = Instant::now();
            let read_result = tokio::select! {
                biased;

                // Priority: check shutdown first
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received during read");
                        break;
                    }
                    continue;
                }

                result = channel.read(batch_size, block_timeout) => result,
            };

            let result = match read_result {
                Ok(entries) => {
                    metrics::record_stream_read(&topic, entries.len(), read_start.elapsed());
                    apply_batch(&*channel, &processor, &stats, &topic, entries).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    attached = false;
                    stats.set_attached(false);
                    stats.record_reconnect();
                    metrics::record_subscriber_reset();
                    metrics::record_error("event_path", e.kind());

                    if let Err(reset_err) = channel.reset().await {
                        debug!(error = %reset_err, "Channel reset failed");
                    }

                    let delay = backoff.delay_for_attempt(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = delay.as_millis() as u64,
                        "Event path error, re-attaching after backoff"
                    );
                    if sleep_or_shutdown(&mut shutdown_rx, delay).await {
                        break;
                    }
                }
            }
        }

        stats.set_attached(false);
        info!("Event subscriber stopped");
    }
    .instrument(span)
    .await
}

/// Process and ack entries one at a time, in order.
///
/// Stops at the first entry that cannot be finalized; it and everything
/// after it stay pending and come back after re-attach.
async fn apply_batch<S: ReplicaStore, C: EventChannel>(
    channel: &C,
    processor: &EventProcessor<S>,
    stats: &SubscriberStats,
    topic: &str,
    entries: Vec<ChannelEntry>,
) -> Result<()> {
    for entry in entries {
        if let Some(age_ms) = entry_age_ms(&entry.id) {
            metrics::record_replication_lag_ms(topic, age_ms);
        }

        let span = info_span!("process_event", entry_id = %entry.id);
        let start = Instant::now();
        let outcome = processor.process(&entry.body).instrument(span).await;
        metrics::record_event_processed(outcome.label(), start.elapsed());
        stats.record_outcome(&outcome);

        if let ProcessOutcome::StoreFailed { reason } = outcome {
            return Err(ReplicationError::Internal(format!(
                "store rejected entry {}: {}",
                entry.id, reason
            )));
        }

        channel.ack(&entry.id).await?;
        stats.record_ack(&entry.id);
        debug!(entry_id = %entry.id, outcome = outcome.label(), "Entry acked");
    }
    Ok(())
}

/// Sleep for `delay` unless shutdown arrives first. Returns true on shutdown.
async fn sleep_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        biased;

        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}
