//! Engine state and health types.
//!
//! # State Transitions
//!
//! ```text
//!                  start()
//! Created ───────────────────→ Syncing
//!    │                              │
//!    │                              │ (bulk sync done or failed,
//!    │                              │  subscriber spawned)
//!    │                              ↓
//!    │                          Running
//!    │                              │
//!    │                    shutdown()│
//!    │                              ↓
//!    └─────────────────────→ ShuttingDown ──→ Stopped
//! ```
//!
//! # State Descriptions
//!
//! - **Created**: Initial state after `ReplicaEngine::new()`. Nothing running.
//! - **Syncing**: `start()` called, bulk sync in progress. Not ready.
//! - **Running**: Subscriber attached or attaching. Ready, maybe degraded.
//! - **ShuttingDown**: `shutdown()` called. Subscriber finishing its batch.
//! - **Stopped**: Shutdown complete. Un-acked entries stay in the channel.

use serde::Serialize;
use std::cmp;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::channel::compare_stream_ids;
use crate::processor::ProcessOutcome;

/// State of the replica engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Engine created but not started.
    Created,

    /// Pulling the source's full Platform set.
    Syncing,

    /// Subscriber running; the replica accepts traffic.
    Running,

    /// Waiting for the subscriber to finish the entries in hand.
    ShuttingDown,

    /// Shut down cleanly.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Syncing => write!(f, "Syncing"),
            EngineState::Running => write!(f, "Running"),
            EngineState::ShuttingDown => write!(f, "ShuttingDown"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Live counters shared between the subscriber task and the engine.
#[derive(Debug, Default)]
pub struct SubscriberStats {
    attached: AtomicBool,
    received: AtomicU64,
    applied: AtomicU64,
    duplicates: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
    store_failed: AtomicU64,
    reconnects: AtomicU64,
    /// Highest entry id acked so far.
    last_acked: Mutex<Option<String>>,
}

impl SubscriberStats {
    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &ProcessOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            ProcessOutcome::Applied { .. } => &self.applied,
            ProcessOutcome::Duplicate { .. } => &self.duplicates,
            ProcessOutcome::Ignored { .. } => &self.ignored,
            ProcessOutcome::Malformed { .. } => &self.malformed,
            ProcessOutcome::StoreFailed { .. } => &self.store_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember an acked entry. Replayed entries older than the current
    /// position never move it backwards.
    pub fn record_ack(&self, entry_id: &str) {
        let Ok(mut last) = self.last_acked.lock() else {
            return;
        };
        let ahead = match last.as_deref() {
            Some(current) => compare_stream_ids(entry_id, current) == cmp::Ordering::Greater,
            None => true,
        };
        if ahead {
            *last = Some(entry_id.to_string());
        }
    }

    pub fn last_acked(&self) -> Option<String> {
        self.last_acked.lock().ok().and_then(|last| last.clone())
    }

    pub fn snapshot(&self) -> SubscriberHealth {
        SubscriberHealth {
            attached: self.attached.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            store_failed: self.store_failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SubscriberStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberHealth {
    pub attached: bool,
    pub received: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub store_failed: u64,
    pub reconnects: u64,
}

/// Health snapshot for the `/health` endpoint.
///
/// Built from cached state, plus one bounded lookup of the channel's
/// newest entry id for `lag_ms`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub state: EngineState,
    /// Running (bulk sync finished or skipped, subscriber spawned).
    pub ready: bool,
    /// Bulk sync failed at startup; records created before this replica
    /// came up may be missing until they are re-published.
    pub degraded: bool,
    /// Ready, not degraded, subscriber attached.
    pub healthy: bool,
    pub platform_count: usize,
    pub subscriber: SubscriberHealth,
    /// Highest entry id the subscriber has acked.
    pub last_acked_id: Option<String>,
    /// Milliseconds between the last acked entry and the newest entry on
    /// the channel. `None` until both are known.
    pub lag_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Created.to_string(), "Created");
        assert_eq!(EngineState::Syncing.to_string(), "Syncing");
        assert_eq!(EngineState::Running.to_string(), "Running");
        assert_eq!(EngineState::ShuttingDown.to_string(), "ShuttingDown");
        assert_eq!(EngineState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_stats_count_each_outcome() {
        let stats = SubscriberStats::default();
        stats.record_outcome(&ProcessOutcome::Applied { local_id: 1 });
        stats.record_outcome(&ProcessOutcome::Duplicate { local_id: 1 });
        stats.record_outcome(&ProcessOutcome::Ignored {
            event: "Other".to_string(),
        });
        stats.record_outcome(&ProcessOutcome::Malformed {
            reason: "eof".to_string(),
        });
        stats.record_reconnect();
        stats.set_attached(true);

        let snap = stats.snapshot();
        assert_eq!(snap.received, 4);
        assert_eq!(snap.applied, 1);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.ignored, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.store_failed, 0);
        assert_eq!(snap.reconnects, 1);
        assert!(snap.attached);
    }

    #[test]
    fn test_last_acked_only_moves_forward() {
        let stats = SubscriberStats::default();
        assert_eq!(stats.last_acked(), None);

        stats.record_ack("1000-0");
        stats.record_ack("1000-3");
        assert_eq!(stats.last_acked().as_deref(), Some("1000-3"));

        // Replay of an older pending entry
        stats.record_ack("1000-1");
        assert_eq!(stats.last_acked().as_deref(), Some("1000-3"));

        // Numeric, not lexicographic
        stats.record_ack("999-9");
        assert_eq!(stats.last_acked().as_deref(), Some("1000-3"));
        stats.record_ack("10000-0");
        assert_eq!(stats.last_acked().as_deref(), Some("10000-0"));
    }

    #[test]
    fn test_health_serializes_state_name() {
        let health = HealthCheck {
            state: EngineState::Running,
            ready: true,
            degraded: false,
            healthy: true,
            platform_count: 3,
            subscriber: SubscriberHealth::default(),
            last_acked_id: Some("1000-0".to_string()),
            lag_ms: Some(250),
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["state"], "Running");
        assert_eq!(json["platform_count"], 3);
        assert_eq!(json["subscriber"]["attached"], false);
    }
}
