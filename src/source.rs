//! Source service: owns the authoritative Platform set and fans every
//! create out to the replica.
//!
//! ```text
//!   create_platform ──► RecordStore (commit)
//!                            │
//!               ┌────────────┴────────────┐
//!               ▼                         ▼
//!          SyncPusher                EventPublisher
//!        (HTTP ingest)             (event channel)
//! ```
//!
//! Both propagations run concurrently after the commit. Neither outcome
//! changes the result of the create.

use crate::bulk_sync::BulkSyncResponder;
use crate::channel::EventChannel;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::metrics;
use crate::model::{NewPlatform, Platform};
use crate::publisher::EventPublisher;
use crate::push::SyncPusher;
use crate::store::RecordStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// What happened to one propagation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    /// Channel not configured.
    Skipped,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// A committed Platform plus how its propagation went.
#[derive(Debug, Clone)]
pub struct CreatedPlatform {
    pub platform: Platform,
    pub push: Delivery,
    pub publish: Delivery,
}

pub struct SourceService<C: EventChannel> {
    store: Arc<RecordStore>,
    pusher: Option<SyncPusher>,
    publisher: EventPublisher<C>,
}

impl<C: EventChannel> SourceService<C> {
    pub fn new(
        store: Arc<RecordStore>,
        pusher: Option<SyncPusher>,
        publisher: EventPublisher<C>,
    ) -> Self {
        Self {
            store,
            pusher,
            publisher,
        }
    }

    /// Wire the service from config. Push is disabled without an ingest URL.
    pub fn from_config(store: Arc<RecordStore>, channel: C, config: &SourceConfig) -> Result<Self> {
        let pusher = SyncPusher::from_config(&config.push)?;
        if pusher.is_none() {
            info!("No ingest URL configured, synchronous push disabled");
        }
        let publisher = EventPublisher::from_config(channel, &config.channel);
        Ok(Self::new(store, pusher, publisher))
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn pusher(&self) -> Option<&SyncPusher> {
        self.pusher.as_ref()
    }

    pub fn publisher(&self) -> &EventPublisher<C> {
        &self.publisher
    }

    pub fn bulk_sync_responder(&self) -> BulkSyncResponder {
        BulkSyncResponder::new(Arc::clone(&self.store))
    }

    /// Write the startup seed into an empty store. Seeded Platforms are
    /// neither pushed nor published. Returns how many were written.
    pub async fn seed_platforms(&self, seed: &[NewPlatform]) -> usize {
        if seed.is_empty() {
            return 0;
        }

        let existing = self.store.count().await;
        if existing > 0 {
            info!(existing, "Store already populated, skipping seed");
            return 0;
        }

        for new in seed {
            let platform = self.store.create_platform(new.clone()).await;
            debug!(
                local_id = platform.local_id,
                external_id = %platform.external_id,
                name = %platform.name,
                "Platform seeded"
            );
        }
        info!(count = seed.len(), "Seeded Platforms");
        seed.len()
    }

    /// Commit a new Platform, then push and publish it.
    pub async fn create_platform(&self, new: NewPlatform) -> CreatedPlatform {
        let platform = self.store.create_platform(new).await;
        metrics::record_platform_created();
        info!(
            local_id = platform.local_id,
            external_id = %platform.external_id,
            name = %platform.name,
            "Platform created"
        );

        let (push, publish) = tokio::join!(self.push(&platform), self.publish(&platform));

        CreatedPlatform {
            platform,
            push,
            publish,
        }
    }

    async fn push(&self, platform: &Platform) -> Delivery {
        match &self.pusher {
            None => Delivery::Skipped,
            Some(pusher) => match pusher.push(platform).await {
                Ok(_) => Delivery::Delivered,
                Err(e) => Delivery::Failed(e.to_string()),
            },
        }
    }

    async fn publish(&self, platform: &Platform) -> Delivery {
        match self.publisher.publish(platform).await {
            Ok(_) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }
}
