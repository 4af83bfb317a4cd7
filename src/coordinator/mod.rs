// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replica engine coordinator.
//!
//! Ties together the replica's two inbound paths:
//! - Bulk sync at startup via [`crate::bulk_sync::BulkSyncClient`]
//! - The event subscriber (event path) over an [`EventChannel`]
//!
//! The third path, synchronous push, is served by the HTTP ingest route
//! and writes to the same store.
//!
//! # Lifecycle
//!
//! 1. `start()` runs bulk sync once (failure marks the engine degraded)
//! 2. Spawns the subscriber task
//! 3. Marks the engine `Running` (ready)
//! 4. `shutdown()` signals the subscriber and waits up to the drain timeout

mod event_path;
mod types;

pub use types::{EngineState, HealthCheck, SubscriberHealth, SubscriberStats};

use crate::bulk_sync::{BulkSyncClient, BulkSyncStats};
use crate::channel::{calculate_lag_ms, EventChannel};
use crate::config::ReplicaConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::processor::EventProcessor;
use crate::resilience::RetryConfig;
use crate::store::ReplicaStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Bound on the newest-entry lookup behind [`HealthCheck::lag_ms`].
const LAG_LOOKUP_TIMEOUT: Duration = Duration::from_millis(250);

/// The replica side of platform replication.
///
/// Owns the subscriber task and the startup bulk sync. The store is
/// shared (`Arc`) with the HTTP routes.
pub struct ReplicaEngine<S: ReplicaStore, C: EventChannel> {
    config: ReplicaConfig,

    store: Arc<S>,

    channel: Arc<C>,

    /// `None` when no responder URL is configured.
    bulk_sync: Option<BulkSyncClient>,

    /// Backoff schedule for subscriber re-attach.
    reconnect_backoff: RetryConfig,

    state_tx: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    /// Set when startup bulk sync failed.
    degraded: AtomicBool,

    stats: Arc<SubscriberStats>,

    handles: RwLock<Vec<tokio::task::JoinHandle<()>>>,
}

impl<S: ReplicaStore, C: EventChannel> ReplicaEngine<S, C> {
    /// Create an engine in `Created` state. Call [`start()`](Self::start)
    /// to sync and subscribe.
    pub fn new(config: ReplicaConfig, store: Arc<S>, channel: Arc<C>) -> Result<Self> {
        let bulk_sync = BulkSyncClient::from_config(&config.bulk_sync)?;
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            store,
            channel,
            bulk_sync,
            reconnect_backoff: RetryConfig::daemon(),
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            degraded: AtomicBool::new(false),
            stats: Arc::new(SubscriberStats::default()),
            handles: RwLock::new(Vec::new()),
        })
    }

    /// Override the re-attach backoff (tests use a fast schedule).
    pub fn with_reconnect_backoff(mut self, backoff: RetryConfig) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    /// Whether startup bulk sync failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Health snapshot. No network I/O; the platform count comes from the
    /// store.
    pub async fn health_check(&self) -> HealthCheck {
        let state = self.state();
        let degraded = self.is_degraded();
        let subscriber = self.stats.snapshot();
        let platform_count = match self.store.platform_count().await {
            Ok(count) => count,
            Err(e) => {
                debug!(error = %e, "Platform count unavailable");
                0
            }
        };

        let last_acked_id = self.stats.last_acked();
        let lag_ms = match &last_acked_id {
            Some(acked) => self.subscriber_lag_ms(acked).await,
            None => None,
        };

        let ready = state == EngineState::Running;
        HealthCheck {
            state,
            ready,
            degraded,
            healthy: ready && !degraded && subscriber.attached,
            platform_count,
            subscriber,
            last_acked_id,
            lag_ms,
        }
    }

    /// Lag between `acked` and the newest entry on the channel.
    async fn subscriber_lag_ms(&self, acked: &str) -> Option<u64> {
        let lookup = tokio::time::timeout(LAG_LOOKUP_TIMEOUT, self.channel.latest_id()).await;
        let latest = match lookup {
            Ok(Ok(Some(latest))) => latest,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                debug!(error = %e, "Newest entry id unavailable");
                return None;
            }
            Err(_) => {
                debug!("Newest entry id lookup timed out");
                return None;
            }
        };

        let lag_ms = calculate_lag_ms(acked, &latest)?;
        metrics::set_subscriber_lag_ms(self.channel.topic(), lag_ms);
        Some(lag_ms)
    }

    /// Start the engine.
    ///
    /// Bulk sync runs to completion (or failure) before the subscriber is
    /// spawned and before the engine reports ready.
    pub async fn start(&self) -> Result<()> {
        if self.state() != EngineState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }

        info!(
            topic = %self.channel.topic(),
            bulk_sync = self.bulk_sync.is_some(),
            "Starting replica engine"
        );
        self.set_state(EngineState::Syncing);

        match self.run_bulk_sync().await {
            Ok(Some(stats)) => {
                debug!(fetched = stats.fetched, inserted = stats.inserted, "Startup sync applied");
            }
            Ok(None) => info!("No bulk sync URL configured, skipping startup sync"),
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                warn!(error = %e, "Startup sync failed, continuing in degraded mode");
            }
        }

        if let Ok(count) = self.store.platform_count().await {
            metrics::set_replica_platforms(count);
        }

        self.spawn_subscriber().await;

        self.set_state(EngineState::Running);
        info!(degraded = self.is_degraded(), "Replica engine running");
        Ok(())
    }

    async fn run_bulk_sync(&self) -> Result<Option<BulkSyncStats>> {
        match &self.bulk_sync {
            None => Ok(None),
            Some(client) => client.sync_into(&*self.store).await.map(Some),
        }
    }

    async fn spawn_subscriber(&self) {
        let channel = Arc::clone(&self.channel);
        let processor = EventProcessor::new(Arc::clone(&self.store));
        let config = self.config.subscriber.clone();
        let backoff = self.reconnect_backoff.clone();
        let stats = Arc::clone(&self.stats);
        let shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            event_path::run_subscriber(channel, processor, config, backoff, stats, shutdown_rx)
                .await;
        });

        info!("Spawned event subscriber");
        self.handles.write().await.push(handle);
    }

    /// Shut down gracefully.
    ///
    /// 1. Signal the subscriber to stop
    /// 2. Wait up to `drain_timeout` for it to finish the batch in hand
    pub async fn shutdown(&self) {
        if self.state() == EngineState::Stopped {
            return;
        }

        info!("Shutting down replica engine");
        self.set_state(EngineState::ShuttingDown);

        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = {
            let mut guard = self.handles.write().await;
            std::mem::take(&mut *guard)
        };

        let drain_timeout = self.config.subscriber.drain_timeout_duration();
        for (i, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(drain_timeout, handle).await {
                Ok(Ok(())) => debug!(task = i + 1, "Task completed gracefully"),
                Ok(Err(e)) => warn!(task = i + 1, error = %e, "Task panicked during shutdown"),
                Err(_) => warn!(
                    task = i + 1,
                    "Task timed out during shutdown (un-acked entries stay queued)"
                ),
            }
        }

        self.set_state(EngineState::Stopped);
        info!("Replica engine stopped");
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::BulkSyncConfig;
    use crate::store::RecordStore;
    use std::time::Duration;

    type TestEngine = ReplicaEngine<RecordStore, MemoryChannel>;

    fn engine(config: ReplicaConfig) -> TestEngine {
        ReplicaEngine::new(
            config,
            Arc::new(RecordStore::new()),
            Arc::new(MemoryChannel::new("platforms")),
        )
        .unwrap()
        .with_reconnect_backoff(RetryConfig::testing())
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_engine_initial_state() {
        let engine = engine(ReplicaConfig::for_testing());
        assert_eq!(engine.state(), EngineState::Created);
        assert!(!engine.is_running());
        assert!(!engine.is_degraded());
    }

    #[tokio::test]
    async fn test_start_without_bulk_sync_runs_and_subscribes() {
        let engine = engine(ReplicaConfig::for_testing());
        engine.start().await.unwrap();
        assert!(engine.is_running());

        let stats = Arc::clone(&engine.stats);
        wait_for(|| stats.snapshot().attached).await;

        let health = engine.health_check().await;
        assert!(health.ready);
        assert!(health.healthy);
        assert!(!health.degraded);

        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let engine = engine(ReplicaConfig::for_testing());
        engine.start().await.unwrap();

        match engine.start().await {
            Err(ReplicationError::InvalidState { expected, actual }) => {
                assert_eq!(expected, "Created");
                assert_eq!(actual, "Running");
            }
            other => panic!("Expected InvalidState error, got {:?}", other.map(|_| ())),
        }
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_bulk_sync_degrades_but_runs() {
        let config = ReplicaConfig {
            bulk_sync: BulkSyncConfig::for_testing("http://127.0.0.1:1/api/platforms"),
            ..ReplicaConfig::for_testing()
        };
        let engine = engine(config);
        engine.start().await.unwrap();

        let health = engine.health_check().await;
        assert!(health.ready);
        assert!(health.degraded);
        assert!(!health.healthy);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_from_created() {
        let engine = engine(ReplicaConfig::for_testing());
        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);
        // Second call is a no-op.
        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_events_applied_while_running() {
        let engine = engine(ReplicaConfig::for_testing());
        engine.start().await.unwrap();

        engine
            .channel()
            .publish(
                r#"{"event":"Platform_Published","id":"X1","name":"Kafka","publisher":"Confluent","cost":"Free"}"#
                    .to_string(),
            )
            .await
            .unwrap();

        let stats = Arc::clone(&engine.stats);
        wait_for(|| stats.snapshot().applied == 1).await;
        assert!(engine.store().external_exists("X1").await);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_reports_subscriber_lag() {
        let engine = engine(ReplicaConfig::for_testing());
        engine.start().await.unwrap();

        let health = engine.health_check().await;
        assert_eq!(health.last_acked_id, None);
        assert_eq!(health.lag_ms, None);

        let first = engine
            .channel()
            .publish(
                r#"{"event":"Platform_Published","id":"X1","name":"Kafka","publisher":"Confluent","cost":"Free"}"#
                    .to_string(),
            )
            .await
            .unwrap();
        let stats = Arc::clone(&engine.stats);
        wait_for(|| stats.last_acked().is_some()).await;

        let health = engine.health_check().await;
        assert_eq!(health.last_acked_id.as_deref(), Some(first.as_str()));
        assert_eq!(health.lag_ms, Some(0));

        // Entries queued behind a paused channel show up as lag.
        engine.channel().pause().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.channel().publish("queued".to_string()).await.unwrap();

        let health = engine.health_check().await;
        assert_eq!(health.last_acked_id.as_deref(), Some(first.as_str()));
        assert!(health.lag_ms.unwrap() >= 20);

        engine.shutdown().await;
    }
}
