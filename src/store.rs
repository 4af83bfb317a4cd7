// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record store and the replica-side store seam.
//!
//! [`RecordStore`] is the in-memory keyed store of Platform and Command
//! records used by both services. The replication paths only need the
//! narrow [`ReplicaStore`] trait (existence check + idempotent upsert), so
//! the processor, bulk sync client and ingest route can be driven by a
//! mock in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use platform_replication::store::{BoxFuture, ReplicaStore};
//! use platform_replication::model::{PlatformPayload, UpsertOutcome};
//!
//! struct CountingStore;
//!
//! impl ReplicaStore for CountingStore {
//!     fn exists(&self, _external_id: &str) -> BoxFuture<'_, bool> {
//!         Box::pin(async move { Ok(false) })
//!     }
//!
//!     fn upsert(&self, _payload: PlatformPayload) -> BoxFuture<'_, UpsertOutcome> {
//!         Box::pin(async move { Ok(UpsertOutcome::Inserted { local_id: 1 }) })
//!     }
//!
//!     fn platform_count(&self) -> BoxFuture<'_, usize> {
//!         Box::pin(async move { Ok(0) })
//!     }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::model::{Command, NewCommand, NewPlatform, Platform, PlatformPayload, UpsertOutcome};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Type alias for boxed async futures (keeps the trait object-safe).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the replication paths need from the replica's store.
pub trait ReplicaStore: Send + Sync + 'static {
    /// Whether a Platform with this external id is already held.
    fn exists(&self, external_id: &str) -> BoxFuture<'_, bool>;

    /// Insert the Platform unless its external id is already present.
    ///
    /// Must be atomic with respect to concurrent upserts of the same id.
    fn upsert(&self, payload: PlatformPayload) -> BoxFuture<'_, UpsertOutcome>;

    /// Number of Platform records held (for health reporting).
    fn platform_count(&self) -> BoxFuture<'_, usize>;
}

impl<T: ReplicaStore> ReplicaStore for Arc<T> {
    fn exists(&self, external_id: &str) -> BoxFuture<'_, bool> {
        (**self).exists(external_id)
    }

    fn upsert(&self, payload: PlatformPayload) -> BoxFuture<'_, UpsertOutcome> {
        (**self).upsert(payload)
    }

    fn platform_count(&self) -> BoxFuture<'_, usize> {
        (**self).platform_count()
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Index = local_id - 1.
    platforms: Vec<Platform>,
    /// external_id -> local_id
    by_external: HashMap<String, u64>,
    /// Index = command id - 1.
    commands: Vec<Command>,
}

impl Inner {
    fn platform(&self, local_id: u64) -> Option<&Platform> {
        let idx = usize::try_from(local_id).ok()?.checked_sub(1)?;
        self.platforms.get(idx)
    }

    fn insert_platform(&mut self, payload: PlatformPayload) -> u64 {
        let local_id = self.platforms.len() as u64 + 1;
        self.by_external.insert(payload.external_id.clone(), local_id);
        self.platforms.push(Platform {
            local_id,
            external_id: payload.external_id,
            name: payload.name,
            publisher: payload.publisher,
            cost: payload.cost,
        });
        local_id
    }
}

/// In-memory Platform / Command store.
///
/// All mutations take the single write guard, so "check then insert" in
/// [`upsert`](ReplicaStore::upsert) cannot interleave with another writer.
#[derive(Debug, Default)]
pub struct RecordStore {
    inner: RwLock<Inner>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Platform at the source: mints a fresh external id (UUID v4)
    /// and the next local id.
    pub async fn create_platform(&self, new: NewPlatform) -> Platform {
        let payload = PlatformPayload {
            external_id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            publisher: new.publisher,
            cost: new.cost,
        };

        let mut inner = self.inner.write().await;
        let local_id = inner.insert_platform(payload);
        let platform = inner.platforms[(local_id - 1) as usize].clone();
        debug!(local_id, external_id = %platform.external_id, "Platform created");
        platform
    }

    /// Idempotent insert keyed by external id.
    pub async fn upsert_platform(&self, payload: PlatformPayload) -> UpsertOutcome {
        let mut inner = self.inner.write().await;
        if let Some(&local_id) = inner.by_external.get(&payload.external_id) {
            debug!(external_id = %payload.external_id, local_id, "Platform already present");
            return UpsertOutcome::Unchanged { local_id };
        }
        let external_id = payload.external_id.clone();
        let local_id = inner.insert_platform(payload);
        debug!(%external_id, local_id, "Platform inserted");
        UpsertOutcome::Inserted { local_id }
    }

    pub async fn external_exists(&self, external_id: &str) -> bool {
        self.inner.read().await.by_external.contains_key(external_id)
    }

    pub async fn platform_exists(&self, local_id: u64) -> bool {
        self.inner.read().await.platform(local_id).is_some()
    }

    pub async fn get_platform(&self, local_id: u64) -> Option<Platform> {
        self.inner.read().await.platform(local_id).cloned()
    }

    /// All Platforms in insertion order.
    pub async fn list_platforms(&self) -> Vec<Platform> {
        self.inner.read().await.platforms.clone()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.platforms.len()
    }

    /// Create a Command under an existing Platform.
    pub async fn create_command(&self, platform_local_id: u64, new: NewCommand) -> Result<Command> {
        let mut inner = self.inner.write().await;
        if inner.platform(platform_local_id).is_none() {
            return Err(ReplicationError::platform_not_found(platform_local_id));
        }
        let command = Command {
            id: inner.commands.len() as u64 + 1,
            platform_local_id,
            how_to: new.how_to,
            command_line: new.command_line,
        };
        inner.commands.push(command.clone());
        Ok(command)
    }

    /// Commands of one Platform in insertion order.
    pub async fn list_commands(&self, platform_local_id: u64) -> Result<Vec<Command>> {
        let inner = self.inner.read().await;
        if inner.platform(platform_local_id).is_none() {
            return Err(ReplicationError::platform_not_found(platform_local_id));
        }
        Ok(inner
            .commands
            .iter()
            .filter(|c| c.platform_local_id == platform_local_id)
            .cloned()
            .collect())
    }

    /// A Command only if it belongs to the given Platform.
    pub async fn get_command(&self, platform_local_id: u64, command_id: u64) -> Option<Command> {
        let inner = self.inner.read().await;
        let idx = usize::try_from(command_id).ok()?.checked_sub(1)?;
        inner
            .commands
            .get(idx)
            .filter(|c| c.platform_local_id == platform_local_id)
            .cloned()
    }
}

impl ReplicaStore for RecordStore {
    fn exists(&self, external_id: &str) -> BoxFuture<'_, bool> {
        let external_id = external_id.to_string();
        Box::pin(async move { Ok(self.external_exists(&external_id).await) })
    }

    fn upsert(&self, payload: PlatformPayload) -> BoxFuture<'_, UpsertOutcome> {
        Box::pin(async move { Ok(self.upsert_platform(payload).await) })
    }

    fn platform_count(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move { Ok(self.count().await) })
    }
}
