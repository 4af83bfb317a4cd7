//! # Platform Replication
//!
//! Keeps a read replica of the Platform set (held by the platform
//! service) inside the commands service.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────── platform-service ─────────────┐        ┌───────────── commands-service ──────────────┐
//! │                                             │        │                                             │
//! │  POST /api/platforms                        │  push  │  POST /api/c/platforms ──┐                  │
//! │        │                        SyncPusher ─┼───────►│                          ▼                  │
//! │        ▼                                    │        │                    RecordStore (replica)    │
//! │  RecordStore ──► EventPublisher ──┐         │        │                      ▲          ▲           │
//! │        │                          │         │        │                      │          │           │
//! │        └──► GET /api/platforms ◄──┼─────────┼────────┼── BulkSyncClient ────┘          │           │
//! │                                   │         │        │   (once, at start)              │           │
//! └───────────────────────────────────┼─────────┘        │                    EventProcessor           │
//!                                     │                  │                          ▲                  │
//!                                     ▼                  │                          │                  │
//!                          ┌──────────────────────┐      │                  event_path subscriber      │
//!                          │ Redis stream (topic) │──────┼──────────────────────────┘                  │
//!                          │  consumer group      │      │                                             │
//!                          └──────────────────────┘      └─────────────────────────────────────────────┘
//! ```
//!
//! ## Three Propagation Paths
//!
//! 1. **Push**: best-effort HTTP POST from inside the create request
//! 2. **Events**: `Platform_Published` on a durable, ordered channel
//! 3. **Bulk sync**: full pull when the replica starts
//!
//! All three land in the same idempotent upsert keyed by the Platform's
//! external id, so overlap between them is harmless.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_replication::channel::MemoryChannel;
//! use platform_replication::config::ReplicaConfig;
//! use platform_replication::coordinator::ReplicaEngine;
//! use platform_replication::store::RecordStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ReplicaEngine::new(
//!         ReplicaConfig::default(),
//!         Arc::new(RecordStore::new()),
//!         Arc::new(MemoryChannel::new("platforms:events")),
//!     )
//!     .expect("valid config");
//!     engine.start().await.expect("Failed to start");
//!
//!     // Engine runs until shutdown
//!     engine.shutdown().await;
//! }
//! ```

pub mod api;
pub mod bulk_sync;
pub mod channel;
pub mod circuit_breaker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod publisher;
pub mod push;
pub mod resilience;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use bulk_sync::{BulkSyncClient, BulkSyncResponder, BulkSyncStats};
pub use channel::{EventChannel, MemoryChannel, RedisChannel};
pub use config::{ReplicaConfig, SourceConfig};
pub use coordinator::{EngineState, HealthCheck, ReplicaEngine};
pub use error::{ReplicationError, Result};
pub use model::{NewPlatform, Platform, PlatformPayload, ReplicationMessage, UpsertOutcome};
pub use processor::{EventProcessor, ProcessOutcome};
pub use publisher::EventPublisher;
pub use push::SyncPusher;
pub use source::SourceService;
pub use store::{RecordStore, ReplicaStore};
