//! Asynchronous propagation: publish a `Platform_Published` event.

use crate::channel::EventChannel;
use crate::config::ChannelConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::model::{Platform, ReplicationMessage};
use std::time::Duration;
use tracing::{debug, warn};

/// Wraps Platforms in replication messages and appends them to the channel.
///
/// Failures are returned, never retried here; the source logs and moves on.
pub struct EventPublisher<C: EventChannel> {
    channel: C,
    timeout: Duration,
}

impl<C: EventChannel> EventPublisher<C> {
    pub fn new(channel: C, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    pub fn from_config(channel: C, config: &ChannelConfig) -> Self {
        Self::new(channel, config.publish_timeout_duration())
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Publish the Platform. Returns the channel entry id.
    pub async fn publish(&self, platform: &Platform) -> Result<String> {
        let message = ReplicationMessage::published(platform.to_payload());
        let body = serde_json::to_string(&message)
            .map_err(|e| ReplicationError::Internal(format!("serialize message: {}", e)))?;
        let topic = self.channel.topic().to_string();

        let result = match tokio::time::timeout(self.timeout, self.channel.publish(body)).await {
            Ok(result) => result,
            Err(_) => Err(ReplicationError::timeout("publish", self.timeout)),
        };

        match &result {
            Ok(entry_id) => {
                metrics::record_publish(&topic, "published");
                debug!(
                    %topic,
                    %entry_id,
                    external_id = %platform.external_id,
                    "Published Platform_Published"
                );
            }
            Err(e) => {
                metrics::record_publish(&topic, "failed");
                metrics::record_error("publisher", e.kind());
                warn!(%topic, external_id = %platform.external_id, error = %e, "Publish failed");
            }
        }
        result
    }
}
