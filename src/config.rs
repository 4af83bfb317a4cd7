//! Configuration for the source and replica services.
//!
//! Configuration is plain serde data. It can be built programmatically,
//! loaded from a JSON file with [`load_json`], or assembled by the binaries
//! from CLI flags / environment variables.
//!
//! # Configuration Structure
//!
//! ```text
//! SourceConfig                       ReplicaConfig
//! ├── http: HttpConfig               ├── http: HttpConfig
//! ├── push: PushConfig               ├── bulk_sync: BulkSyncConfig
//! │   └── ingest_url                 │   └── url
//! └── channel: ChannelConfig         ├── channel: ChannelConfig
//!                                    └── subscriber: SubscriberConfig
//! ```
//!
//! # JSON Example (replica)
//!
//! ```json
//! {
//!   "http": { "bind_addr": "0.0.0.0:6000" },
//!   "bulk_sync": { "url": "http://platform-service:5000/api/platforms", "timeout": "10s" },
//!   "channel": {
//!     "redis_url": "redis://broker:6379",
//!     "topic": "platforms:events",
//!     "group": "commands-service",
//!     "consumer": "commands-service-1"
//!   },
//!   "subscriber": { "batch_size": 50, "block_timeout": "2s" }
//! }
//! ```
//!
//! Durations are humantime strings (`"500ms"`, `"5s"`, `"2min"`). An
//! unparseable duration falls back to the field's default.

use crate::error::{ReplicationError, Result};
use crate::model::NewPlatform;
use crate::resilience::RetryConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn parse_duration_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}

/// Load any config type from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ReplicationError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| ReplicationError::Config(format!("invalid {}: {}", path.display(), e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level configs
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration of the source (Platform-owning) service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "HttpConfig::source_default")]
    pub http: HttpConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Platforms written to an empty store at startup, before serving.
    /// Not pushed or published: replicas pick them up through bulk sync.
    #[serde(default)]
    pub seed: Vec<NewPlatform>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::source_default(),
            push: PushConfig::default(),
            channel: ChannelConfig::default(),
            seed: Vec::new(),
        }
    }
}

impl SourceConfig {
    /// Minimal config for tests: no push target, test-friendly timeouts.
    pub fn for_testing() -> Self {
        Self {
            http: HttpConfig {
                bind_addr: "127.0.0.1:0".to_string(),
            },
            push: PushConfig::for_testing(None),
            channel: ChannelConfig::for_testing("platforms:test"),
            seed: Vec::new(),
        }
    }
}

/// Configuration of the replica (Command-owning) service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicaConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub bulk_sync: BulkSyncConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

impl ReplicaConfig {
    /// Minimal config for tests: no bulk sync, short block/drain timeouts.
    pub fn for_testing() -> Self {
        Self {
            http: HttpConfig {
                bind_addr: "127.0.0.1:0".to_string(),
            },
            bulk_sync: BulkSyncConfig::default(),
            channel: ChannelConfig::for_testing("platforms:test"),
            subscriber: SubscriberConfig::for_testing(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HttpConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address the service's HTTP router binds to.
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6000".to_string(),
        }
    }
}

impl HttpConfig {
    fn source_default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PushConfig: synchronous best-effort push to the replica
// ═══════════════════════════════════════════════════════════════════════════════

/// Synchronous push settings (source side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Full URL of the replica's ingest endpoint.
    /// `None` disables the push; the event channel still carries the update.
    #[serde(default)]
    pub ingest_url: Option<String>,

    /// Per-attempt timeout (e.g. "5s").
    #[serde(default = "default_push_timeout")]
    pub timeout: String,

    /// Attempts per push. 1 = no retry.
    #[serde(default = "default_push_attempts")]
    pub max_attempts: usize,

    /// Consecutive failures before the push circuit opens.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// Seconds the circuit stays open before probing again.
    #[serde(default = "default_circuit_reset_timeout")]
    pub circuit_reset_timeout_sec: u64,
}

fn default_push_timeout() -> String {
    "5s".to_string()
}

fn default_push_attempts() -> usize {
    1
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_reset_timeout() -> u64 {
    30
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ingest_url: None,
            timeout: default_push_timeout(),
            max_attempts: default_push_attempts(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout_sec: default_circuit_reset_timeout(),
        }
    }
}

impl PushConfig {
    /// Create a push config for testing (short timeout, single attempt).
    pub fn for_testing(ingest_url: Option<&str>) -> Self {
        Self {
            ingest_url: ingest_url.map(str::to_string),
            timeout: "500ms".to_string(),
            max_attempts: 1,
            circuit_failure_threshold: 100,
            circuit_reset_timeout_sec: 1,
        }
    }

    /// Parse the timeout string to a Duration.
    pub fn timeout_duration(&self) -> Duration {
        parse_duration_or(&self.timeout, Duration::from_secs(5))
    }

    /// Retry schedule for the push (bounded, never infinite).
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            connection_timeout: self.timeout_duration(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ChannelConfig: event channel (Redis Streams)
// ═══════════════════════════════════════════════════════════════════════════════

/// Event channel settings (both sides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Broker URL, credentials included (e.g. `redis://:secret@broker:6379`).
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Stream key the events are published to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group name. One group per replica service.
    #[serde(default = "default_group")]
    pub group: String,

    /// Consumer name inside the group. One per replica instance.
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// Where a freshly created group starts reading ("0" = whole backlog).
    #[serde(default = "default_group_start_id")]
    pub group_start_id: String,

    /// Optional approximate MAXLEN trim applied on publish.
    #[serde(default)]
    pub max_len: Option<usize>,

    /// Bound on a single publish (e.g. "5s").
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: String,

    /// Bound on a single connection attempt (e.g. "5s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_topic() -> String {
    "platforms:events".to_string()
}

fn default_group() -> String {
    "commands-service".to_string()
}

fn default_consumer() -> String {
    "commands-service-1".to_string()
}

fn default_group_start_id() -> String {
    "0".to_string()
}

fn default_publish_timeout() -> String {
    "5s".to_string()
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            topic: default_topic(),
            group: default_group(),
            consumer: default_consumer(),
            group_start_id: default_group_start_id(),
            max_len: None,
            publish_timeout: default_publish_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl ChannelConfig {
    /// Create a channel config for testing.
    pub fn for_testing(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            publish_timeout: "500ms".to_string(),
            connect_timeout: "500ms".to_string(),
            ..Default::default()
        }
    }

    /// Parse publish_timeout to a Duration.
    pub fn publish_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.publish_timeout, Duration::from_secs(5))
    }

    /// Parse connect_timeout to a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.connect_timeout, Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BulkSyncConfig: cold-start catch-up
// ═══════════════════════════════════════════════════════════════════════════════

/// Bulk sync settings (replica side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSyncConfig {
    /// Full URL of the source's bulk sync responder. `None` skips bulk sync.
    #[serde(default)]
    pub url: Option<String>,

    /// Bound on the whole pull (e.g. "10s").
    #[serde(default = "default_bulk_sync_timeout")]
    pub timeout: String,
}

fn default_bulk_sync_timeout() -> String {
    "10s".to_string()
}

impl Default for BulkSyncConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: default_bulk_sync_timeout(),
        }
    }
}

impl BulkSyncConfig {
    /// Bulk sync config pointing at a responder, for tests.
    pub fn for_testing(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            timeout: "2s".to_string(),
        }
    }

    /// Parse the timeout to a Duration.
    pub fn timeout_duration(&self) -> Duration {
        parse_duration_or(&self.timeout, Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SubscriberConfig: event subscriber loop
// ═══════════════════════════════════════════════════════════════════════════════

/// Event subscriber settings (replica side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Maximum entries per read. Entries are still applied one at a time.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a read blocks waiting for new entries (e.g. "2s").
    #[serde(default = "default_block_timeout")]
    pub block_timeout: String,

    /// How long shutdown waits for the subscriber to finish its batch.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
}

fn default_batch_size() -> usize {
    50
}

fn default_block_timeout() -> String {
    "2s".to_string()
}

fn default_drain_timeout() -> String {
    "10s".to_string()
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            block_timeout: default_block_timeout(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

impl SubscriberConfig {
    /// Fast-cycling config for tests.
    pub fn for_testing() -> Self {
        Self {
            batch_size: 10,
            block_timeout: "20ms".to_string(),
            drain_timeout: "2s".to_string(),
        }
    }

    /// Parse block_timeout to a Duration.
    pub fn block_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.block_timeout, Duration::from_secs(2))
    }

    /// Parse drain_timeout to a Duration.
    pub fn drain_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.drain_timeout, Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_defaults() {
        let config = PushConfig::default();
        assert!(config.ingest_url.is_none());
        assert_eq!(config.timeout_duration(), Duration::from_secs(5));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.retry_config().max_attempts, 1);
    }

    #[test]
    fn test_push_zero_attempts_clamped() {
        let config = PushConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.retry_config().max_attempts, 1);
    }

    #[test]
    fn test_duration_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
            ("2min", Duration::from_secs(120)),
        ];

        for (input, expected) in test_cases {
            let config = SubscriberConfig {
                block_timeout: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.block_timeout_duration(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_duration_invalid_fallback() {
        let config = BulkSyncConfig {
            url: None,
            timeout: "soon".to_string(),
        };
        assert_eq!(config.timeout_duration(), Duration::from_secs(10));

        let channel = ChannelConfig {
            publish_timeout: "whenever".to_string(),
            ..Default::default()
        };
        assert_eq!(channel.publish_timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_channel_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.topic, "platforms:events");
        assert_eq!(config.group, "commands-service");
        assert_eq!(config.group_start_id, "0");
        assert!(config.max_len.is_none());
    }

    #[test]
    fn test_replica_config_partial_json() {
        let json = r#"{
            "bulk_sync": { "url": "http://source:5000/api/platforms" },
            "channel": { "topic": "custom" }
        }"#;
        let config: ReplicaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.bulk_sync.url.as_deref(),
            Some("http://source:5000/api/platforms")
        );
        assert_eq!(config.bulk_sync.timeout, "10s");
        assert_eq!(config.channel.topic, "custom");
        assert_eq!(config.channel.group, "commands-service");
        assert_eq!(config.subscriber.batch_size, 50);
        assert_eq!(config.http.bind_addr, "0.0.0.0:6000");
    }

    #[test]
    fn test_source_config_default_bind() {
        let config: SourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.http.bind_addr, "0.0.0.0:5000");
        assert!(config.push.ingest_url.is_none());
        assert!(config.seed.is_empty());
    }

    #[test]
    fn test_source_config_seed_json() {
        let json = r#"{
            "seed": [
                { "name": "Dot Net", "publisher": "Microsoft", "cost": "Free" },
                { "name": "Kubernetes", "publisher": "CNCF", "cost": "Free" }
            ]
        }"#;
        let config: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed.len(), 2);
        assert_eq!(config.seed[0].name, "Dot Net");
        assert_eq!(config.seed[1].publisher, "CNCF");
    }

    #[test]
    fn test_for_testing_configs() {
        let source = SourceConfig::for_testing();
        assert_eq!(source.channel.topic, "platforms:test");
        assert_eq!(source.push.timeout_duration(), Duration::from_millis(500));

        let replica = ReplicaConfig::for_testing();
        assert!(replica.bulk_sync.url.is_none());
        assert_eq!(
            replica.subscriber.block_timeout_duration(),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn test_load_json_missing_file() {
        let result: Result<ReplicaConfig> = load_json("/definitely/not/here.json");
        assert!(matches!(result, Err(ReplicationError::Config(_))));
    }
}
