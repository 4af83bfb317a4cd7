//! Event dispatch: decides what a delivered message means for the store.
//!
//! | event                 | action                                  |
//! |-----------------------|-----------------------------------------|
//! | `Platform_Published`  | decode payload, idempotent upsert       |
//! | anything else         | log and drop                            |
//!
//! The processor never fails the subscriber loop. Every message ends in a
//! [`ProcessOutcome`] and the caller acks it regardless, except for
//! [`ProcessOutcome::StoreFailed`], which is the only outcome that may
//! succeed on redelivery.

use crate::error::ReplicationError;
use crate::metrics;
use crate::model::{EventKind, PlatformPayload, ReplicationMessage, UpsertOutcome};
use crate::store::ReplicaStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// New Platform inserted.
    Applied { local_id: u64 },
    /// External id already present; no-op.
    Duplicate { local_id: u64 },
    /// Unknown event kind; dropped.
    Ignored { event: String },
    /// Not decodable; dropped.
    Malformed { reason: String },
    /// Store rejected the write.
    StoreFailed { reason: String },
}

impl ProcessOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Duplicate { .. } => "duplicate",
            Self::Ignored { .. } => "ignored",
            Self::Malformed { .. } => "malformed",
            Self::StoreFailed { .. } => "store_failed",
        }
    }

    /// Whether the message should be acked (never redelivered).
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::StoreFailed { .. })
    }
}

fn malformed(e: serde_json::Error) -> ProcessOutcome {
    let err = ReplicationError::MalformedMessage(e.to_string());
    metrics::record_error("processor", err.kind());
    ProcessOutcome::Malformed {
        reason: err.to_string(),
    }
}

/// Only the kind, so unknown events with arbitrary payloads still parse.
#[derive(Deserialize)]
struct Envelope {
    event: String,
}

/// Stateless dispatcher from message to store mutation.
pub struct EventProcessor<S: ReplicaStore> {
    store: Arc<S>,
}

impl<S: ReplicaStore> Clone for EventProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ReplicaStore> EventProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Handle one raw message body.
    pub async fn process(&self, body: &str) -> ProcessOutcome {
        let envelope: Envelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping message without a readable event kind");
                return malformed(e);
            }
        };

        match EventKind::parse(&envelope.event) {
            EventKind::PlatformPublished => {
                let payload = match serde_json::from_str::<ReplicationMessage>(body) {
                    Ok(message) => message.payload,
                    Err(e) => {
                        warn!(error = %e, "Dropping Platform_Published with bad payload");
                        return malformed(e);
                    }
                };
                self.apply(payload).await
            }
            EventKind::Unknown(event) => {
                info!(event = %event, "Ignoring unknown event kind");
                ProcessOutcome::Ignored { event }
            }
        }
    }

    async fn apply(&self, payload: PlatformPayload) -> ProcessOutcome {
        let external_id = payload.external_id.clone();
        match self.store.upsert(payload).await {
            Ok(UpsertOutcome::Inserted { local_id }) => {
                info!(%external_id, local_id, "Platform replicated");
                ProcessOutcome::Applied { local_id }
            }
            Ok(UpsertOutcome::Unchanged { local_id }) => {
                debug!(%external_id, local_id, "Platform already replicated");
                ProcessOutcome::Duplicate { local_id }
            }
            Err(e) => {
                warn!(%external_id, error = %e, "Failed to store replicated Platform");
                ProcessOutcome::StoreFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
