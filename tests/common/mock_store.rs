//! Mock ReplicaStore for testing.
//!
//! Wraps a real [`RecordStore`] and records every upsert so tests can
//! assert on delivery order and redelivery. Upserts can be made to fail
//! to simulate a store outage.

use platform_replication::error::{ReplicationError, Result};
use platform_replication::model::{PlatformPayload, UpsertOutcome};
use platform_replication::store::{BoxFuture, RecordStore, ReplicaStore};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// A recorded upsert() call.
#[derive(Debug, Clone)]
pub struct UpsertCall {
    pub external_id: String,
    pub inserted: bool,
}

pub struct RecordingStore {
    inner: RecordStore,
    /// Successful upsert() calls, in call order
    upserts: RwLock<Vec<UpsertCall>>,
    /// When set, every upsert() fails
    failing: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: RecordStore::new(),
            upserts: RwLock::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make upsert() fail (or recover).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> &RecordStore {
        &self.inner
    }

    /// Get all recorded upsert() calls.
    pub async fn upserts(&self) -> Vec<UpsertCall> {
        self.upserts.read().await.clone()
    }

    /// External ids in the order they were first inserted.
    pub async fn inserted_order(&self) -> Vec<String> {
        self.upserts
            .read()
            .await
            .iter()
            .filter(|c| c.inserted)
            .map(|c| c.external_id.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.count().await
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaStore for RecordingStore {
    fn exists(&self, external_id: &str) -> BoxFuture<'_, bool> {
        let external_id = external_id.to_string();
        Box::pin(async move { Ok(self.inner.external_exists(&external_id).await) })
    }

    fn upsert(&self, payload: PlatformPayload) -> BoxFuture<'_, UpsertOutcome> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReplicationError::Internal("Simulated store failure".to_string()));
            }

            let external_id = payload.external_id.clone();
            let outcome = self.inner.upsert_platform(payload).await;
            self.upserts.write().await.push(UpsertCall {
                external_id,
                inserted: outcome.is_inserted(),
            });
            Ok(outcome)
        })
    }

    fn platform_count(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move { Ok(self.inner.count().await) })
    }
}
