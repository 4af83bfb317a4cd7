//! Platform / Command records and the wire shapes that carry them.
//!
//! ```text
//! Platform (store record)          PlatformPayload (wire)
//! ┌─────────────┐                 ┌──────────────┐
//! │ local_id    │  store-local    │              │
//! │ external_id │ ──────────────► │ id           │  idempotency key
//! │ name        │ ──────────────► │ name         │
//! │ publisher   │ ──────────────► │ publisher    │
//! │ cost        │ ──────────────► │ cost         │
//! └─────────────┘                 └──────────────┘
//!                                         │ + event
//!                                         ▼
//!                                 ReplicationMessage
//! ```

use serde::{Deserialize, Serialize};

/// Event kind published for every Platform created at the source.
pub const PLATFORM_PUBLISHED: &str = "Platform_Published";

/// A Platform as held by a store (source or replica).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Store-local id, 1-based in insertion order. Not shared across services.
    pub local_id: u64,
    /// Stable id minted at the source.
    pub external_id: String,
    pub name: String,
    pub publisher: String,
    pub cost: String,
}

impl Platform {
    /// The wire payload for this record.
    pub fn to_payload(&self) -> PlatformPayload {
        PlatformPayload {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            publisher: self.publisher.clone(),
            cost: self.cost.clone(),
        }
    }
}

/// Platform as it travels between services (push body, bulk sync entry,
/// event payload). The external id goes on the wire as `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformPayload {
    #[serde(rename = "id")]
    pub external_id: String,
    pub name: String,
    pub publisher: String,
    pub cost: String,
}

/// Create request at the source. The source mints both ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlatform {
    pub name: String,
    pub publisher: String,
    pub cost: String,
}

/// A Command owned by a replicated Platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u64,
    pub platform_local_id: u64,
    pub how_to: String,
    pub command_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommand {
    pub how_to: String,
    pub command_line: String,
}

/// Result of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// External id was new; a record was created.
    Inserted { local_id: u64 },
    /// External id already present; nothing changed.
    Unchanged { local_id: u64 },
}

impl UpsertOutcome {
    pub fn local_id(&self) -> u64 {
        match self {
            Self::Inserted { local_id } | Self::Unchanged { local_id } => *local_id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Body of the replica's answer to a synchronous push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    pub local_id: u64,
    pub created: bool,
}

impl From<UpsertOutcome> for IngestAck {
    fn from(outcome: UpsertOutcome) -> Self {
        Self {
            local_id: outcome.local_id(),
            created: outcome.is_inserted(),
        }
    }
}

/// Envelope published on the event channel:
/// `{ "event": "Platform_Published", "id", "name", "publisher", "cost" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationMessage {
    pub event: String,
    #[serde(flatten)]
    pub payload: PlatformPayload,
}

impl ReplicationMessage {
    /// Message announcing a newly created Platform.
    pub fn published(payload: PlatformPayload) -> Self {
        Self {
            event: PLATFORM_PUBLISHED.to_string(),
            payload,
        }
    }
}

/// Event kinds the replica knows how to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    PlatformPublished,
    Unknown(String),
}

impl EventKind {
    pub fn parse(event: &str) -> Self {
        match event {
            PLATFORM_PUBLISHED => Self::PlatformPublished,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PlatformPayload {
        PlatformPayload {
            external_id: "X1".to_string(),
            name: "Kafka".to_string(),
            publisher: "Confluent".to_string(),
            cost: "Free".to_string(),
        }
    }

    #[test]
    fn test_payload_uses_id_on_the_wire() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["id"], "X1");
        assert!(json.get("external_id").is_none());
    }

    #[test]
    fn test_message_is_flat() {
        let json = serde_json::to_string(&ReplicationMessage::published(payload())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "Platform_Published");
        assert_eq!(value["id"], "X1");
        assert_eq!(value["name"], "Kafka");
        assert_eq!(value["publisher"], "Confluent");
        assert_eq!(value["cost"], "Free");
    }

    #[test]
    fn test_message_parses_from_external_json() {
        let raw = r#"{"event":"Platform_Published","id":"X1","name":"Kafka","publisher":"Confluent","cost":"Free"}"#;
        let msg: ReplicationMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.payload, payload());
        assert_eq!(EventKind::parse(&msg.event), EventKind::PlatformPublished);
    }

    #[test]
    fn test_event_kind_unknown() {
        assert_eq!(
            EventKind::parse("Platform_Deleted"),
            EventKind::Unknown("Platform_Deleted".to_string())
        );
        // Kinds are case-sensitive.
        assert!(matches!(EventKind::parse("platform_published"), EventKind::Unknown(_)));
    }

    #[test]
    fn test_to_payload_drops_local_id() {
        let platform = Platform {
            local_id: 7,
            external_id: "X1".to_string(),
            name: "Kafka".to_string(),
            publisher: "Confluent".to_string(),
            cost: "Free".to_string(),
        };
        assert_eq!(platform.to_payload(), payload());
    }

    #[test]
    fn test_upsert_outcome_accessors() {
        let inserted = UpsertOutcome::Inserted { local_id: 3 };
        let unchanged = UpsertOutcome::Unchanged { local_id: 3 };
        assert!(inserted.is_inserted());
        assert!(!unchanged.is_inserted());
        assert_eq!(inserted.local_id(), unchanged.local_id());
    }
}
