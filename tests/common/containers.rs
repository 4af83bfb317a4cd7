// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for Redis.
//!
//! Provides helpers to spin up a Redis broker for the event channel tests.

use platform_replication::channel::RedisChannel;
use platform_replication::config::ChannelConfig;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla Redis container (streams-compatible).
///
/// Uses official redis:7 image. Waits for "Ready to accept connections".
pub fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Get the Redis URL for a container.
pub fn redis_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(6379);
    format!("redis://127.0.0.1:{}", port)
}

/// A broker container plus channel config pointing at it.
pub struct TestBroker<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub redis_url: String,
}

impl<'a> TestBroker<'a> {
    pub fn new(docker: &'a Cli) -> Self {
        let container = redis_container(docker);
        let redis_url = redis_url(&container);
        Self {
            container,
            redis_url,
        }
    }

    /// Channel config for `topic` with the given consumer name.
    pub fn channel_config(&self, topic: &str, consumer: &str) -> ChannelConfig {
        ChannelConfig {
            redis_url: self.redis_url.clone(),
            consumer: consumer.to_string(),
            ..ChannelConfig::for_testing(topic)
        }
    }

    pub fn channel(&self, topic: &str, consumer: &str) -> RedisChannel {
        RedisChannel::new(self.channel_config(topic, consumer)).expect("valid redis url")
    }

    /// Number of entries in `topic`.
    pub async fn stream_len(&self, topic: &str) -> redis::RedisResult<usize> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        use redis::AsyncCommands;
        conn.xlen(topic).await
    }

    /// Append a raw entry without going through the publisher.
    pub async fn add_raw(
        &self,
        topic: &str,
        field: &str,
        value: &str,
    ) -> redis::RedisResult<String> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        use redis::AsyncCommands;
        conn.xadd(topic, "*", &[(field, value)]).await
    }
}
