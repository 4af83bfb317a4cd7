// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis Streams event channel.
//!
//! # Commands
//!
//! ```text
//! publish   XADD <topic> [MAXLEN ~ n] * message <json>
//! attach    XGROUP CREATE <topic> <group> <start> MKSTREAM   (BUSYGROUP ok)
//! read      XREADGROUP GROUP <group> <consumer> COUNT n STREAMS <topic> 0
//!             ... until this consumer's pending list is drained, then
//!           XREADGROUP GROUP <group> <consumer> COUNT n BLOCK ms STREAMS <topic> >
//! ack       XACK <topic> <group> <id>
//! ```
//!
//! Connections are lazy and use `redis::aio::ConnectionManager`, which is
//! multiplexed and cheap to clone. Each connection attempt is bounded by
//! `connect_timeout`.

use super::{ChannelEntry, EventChannel, MESSAGE_FIELD};
use crate::config::ChannelConfig;
use crate::error::{ReplicationError, Result};
use crate::resilience::{retry_with_backoff, RetryConfig};
use crate::store::BoxFuture;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Event channel backed by a Redis stream and a consumer group.
pub struct RedisChannel {
    config: ChannelConfig,
    client: Client,
    /// None until first use, and again after `reset()`.
    conn: RwLock<Option<ConnectionManager>>,
    /// Set once the post-attach pass over pending entries came back empty.
    pending_drained: AtomicBool,
}

impl RedisChannel {
    /// Create a channel (not yet connected).
    pub fn new(config: ChannelConfig) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| ReplicationError::Config(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            config,
            client,
            conn: RwLock::new(None),
            pending_drained: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Connect with retry, e.g. `RetryConfig::startup()` at process start.
    pub async fn connect(&self, retry_config: &RetryConfig) -> Result<()> {
        info!(topic = %self.config.topic, "Connecting to event broker");
        retry_with_backoff(retry_config, "redis_connect", || self.open_connection()).await?;
        info!(topic = %self.config.topic, "Connected to event broker");
        Ok(())
    }

    /// Whether a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.conn.read().await.is_some()
    }

    async fn open_connection(&self) -> Result<ConnectionManager> {
        let connect_timeout = self.config.connect_timeout_duration();
        let conn = match timeout(connect_timeout, self.client.get_connection_manager()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(ReplicationError::redis("connect", e)),
            Err(_) => return Err(ReplicationError::timeout("redis_connect", connect_timeout)),
        };
        *self.conn.write().await = Some(conn.clone());
        Ok(conn)
    }

    /// Current connection, connecting lazily (single bounded attempt).
    async fn connection(&self) -> Result<ConnectionManager> {
        if let Some(conn) = self.conn.read().await.clone() {
            return Ok(conn);
        }
        self.open_connection().await
    }

    async fn xrevrange_latest(&self) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(&self.config.topic)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(|e| ReplicationError::redis("XREVRANGE", e))?;
        Ok(reply.ids.first().map(|entry| entry.id.clone()))
    }

    /// Number of entries in the stream (0 if it doesn't exist).
    pub async fn stream_length(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        redis::cmd("XLEN")
            .arg(&self.config.topic)
            .query_async(&mut conn)
            .await
            .map_err(|e| ReplicationError::redis("XLEN", e))
    }

    async fn xadd(&self, body: String) -> Result<String> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.config.topic);
        if let Some(max_len) = self.config.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(MESSAGE_FIELD).arg(body);

        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ReplicationError::redis("XADD", e))?;
        trace!(topic = %self.config.topic, entry_id = %id, "Published entry");
        Ok(id)
    }

    async fn create_group(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.topic)
            .arg(&self.config.group)
            .arg(&self.config.group_start_id)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    topic = %self.config.topic,
                    group = %self.config.group,
                    start_id = %self.config.group_start_id,
                    "Created consumer group"
                );
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.config.group, "Consumer group already exists");
            }
            Err(e) => return Err(ReplicationError::redis("XGROUP CREATE", e)),
        }

        self.pending_drained.store(false, Ordering::Release);
        Ok(())
    }

    async fn read_group(&self, max: usize, block: Duration) -> Result<Vec<ChannelEntry>> {
        let mut conn = self.connection().await?;
        let count = max.max(1);

        // Re-deliver our own un-acked entries first; "0" never blocks.
        if !self.pending_drained.load(Ordering::Acquire) {
            let opts = StreamReadOptions::default()
                .group(&self.config.group, &self.config.consumer)
                .count(count);
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[&self.config.topic], &["0"], &opts)
                .await
                .map_err(|e| ReplicationError::redis("XREADGROUP pending", e))?;

            let entries = self.collect(reply.unwrap_or_default());
            if !entries.is_empty() {
                debug!(
                    topic = %self.config.topic,
                    count = entries.len(),
                    "Re-delivering pending entries"
                );
                return Ok(entries);
            }
            self.pending_drained.store(true, Ordering::Release);
        }

        let opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(count)
            .block(block.as_millis() as usize);
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.topic], &[">"], &opts)
            .await
            .map_err(|e| ReplicationError::redis("XREADGROUP", e))?;

        Ok(self.collect(reply.unwrap_or_default()))
    }

    fn collect(&self, reply: StreamReadReply) -> Vec<ChannelEntry> {
        let mut entries = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                entries.push(self.to_entry(entry));
            }
        }
        entries
    }

    /// An entry without a readable `message` field still has to be acked,
    /// so it is handed on with an empty body and rejected downstream.
    fn to_entry(&self, entry: StreamId) -> ChannelEntry {
        let body = match entry.map.get(MESSAGE_FIELD) {
            Some(value) => match redis::from_redis_value::<String>(value) {
                Ok(body) => body,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Unreadable message field");
                    String::new()
                }
            },
            None => {
                warn!(entry_id = %entry.id, "Entry has no message field");
                String::new()
            }
        };
        ChannelEntry { id: entry.id, body }
    }

    async fn xack(&self, entry_id: String) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: u64 = conn
            .xack(&self.config.topic, &self.config.group, &[entry_id])
            .await
            .map_err(|e| ReplicationError::redis("XACK", e))?;
        Ok(())
    }

    async fn drop_connection(&self) {
        *self.conn.write().await = None;
        self.pending_drained.store(false, Ordering::Release);
        warn!(topic = %self.config.topic, "Broker connection dropped");
    }
}

impl EventChannel for RedisChannel {
    fn topic(&self) -> &str {
        &self.config.topic
    }

    fn publish(&self, body: String) -> BoxFuture<'_, String> {
        Box::pin(self.xadd(body))
    }

    fn attach(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.create_group())
    }

    fn read(&self, max: usize, block: Duration) -> BoxFuture<'_, Vec<ChannelEntry>> {
        Box::pin(self.read_group(max, block))
    }

    fn ack(&self, entry_id: &str) -> BoxFuture<'_, ()> {
        Box::pin(self.xack(entry_id.to_string()))
    }

    fn reset(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.drop_connection().await;
            Ok(())
        })
    }

    fn latest_id(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(self.xrevrange_latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn channel() -> RedisChannel {
        RedisChannel::new(ChannelConfig::for_testing("platforms:unit")).unwrap()
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let config = ChannelConfig {
            redis_url: "not a url".to_string(),
            ..ChannelConfig::default()
        };
        assert!(matches!(RedisChannel::new(config), Err(ReplicationError::Config(_))));
    }

    #[tokio::test]
    async fn test_lazy_not_connected() {
        let channel = channel();
        assert!(!channel.is_connected().await);
        assert_eq!(channel.topic(), "platforms:unit");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let config = ChannelConfig {
            redis_url: "redis://127.0.0.1:1".to_string(),
            ..ChannelConfig::for_testing("platforms:unit")
        };
        let channel = RedisChannel::new(config).unwrap();
        let retry = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::testing()
        };

        assert!(channel.connect(&retry).await.is_err());
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn test_reset_clears_pending_flag() {
        let channel = channel();
        channel.pending_drained.store(true, Ordering::Release);
        channel.reset().await.unwrap();
        assert!(!channel.pending_drained.load(Ordering::Acquire));
    }

    #[test]
    fn test_to_entry_reads_message_field() {
        let channel = channel();
        let mut map = HashMap::new();
        map.insert(
            MESSAGE_FIELD.to_string(),
            redis::Value::BulkString(br#"{"event":"Platform_Published"}"#.to_vec()),
        );
        let entry = channel.to_entry(StreamId {
            id: "1-0".to_string(),
            map,
        });
        assert_eq!(entry.id, "1-0");
        assert_eq!(entry.body, r#"{"event":"Platform_Published"}"#);
    }

    #[test]
    fn test_to_entry_missing_field_gives_empty_body() {
        let channel = channel();
        let entry = channel.to_entry(StreamId {
            id: "2-0".to_string(),
            map: HashMap::new(),
        });
        assert_eq!(entry.id, "2-0");
        assert!(entry.body.is_empty());
    }

    #[test]
    fn test_to_entry_wrong_type_gives_empty_body() {
        let channel = channel();
        let mut map = HashMap::new();
        map.insert(MESSAGE_FIELD.to_string(), redis::Value::Nil);
        let entry = channel.to_entry(StreamId {
            id: "3-0".to_string(),
            map,
        });
        assert!(entry.body.is_empty());
    }
}
