// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event channel: the durable, ordered, at-least-once transport between
//! the source's publisher and the replica's subscriber.
//!
//! # Delivery Contract
//!
//! ```text
//!  publish(body) ──► [ e1 | e2 | e3 | e4 ] ──► read() ──► process ──► ack(id)
//!                      ▲ acked   ▲ pending (delivered, not acked)
//!                                        ▲ not yet delivered
//! ```
//!
//! - Entries are delivered in publish order within a topic.
//! - Entries published while no subscriber is attached are queued.
//! - An entry delivered but never acked is delivered again after the
//!   subscriber re-attaches (at-least-once). Consumers must be idempotent.
//!
//! Two implementations:
//! - [`RedisChannel`]: Redis Streams + consumer group (production)
//! - [`MemoryChannel`]: in-process, with fault injection (tests, single-process demos)

mod memory;
mod redis_streams;

pub use self::memory::MemoryChannel;
pub use self::redis_streams::RedisChannel;

use crate::store::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Stream entry field holding the serialized message.
pub const MESSAGE_FIELD: &str = "message";

/// One delivered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Channel-assigned id (`{millis}-{seq}`), used for ack.
    pub id: String,
    /// Raw message body, as published.
    pub body: String,
}

/// Transport seam used by [`EventPublisher`](crate::publisher::EventPublisher)
/// and the replica's subscriber loop.
pub trait EventChannel: Send + Sync + 'static {
    /// Topic (stream key) this channel publishes to / reads from.
    fn topic(&self) -> &str;

    /// Append a message. Returns the entry id.
    fn publish(&self, body: String) -> BoxFuture<'_, String>;

    /// Join the consumer group (creating it if needed). Must be called
    /// before [`read`](Self::read), and again after [`reset`](Self::reset).
    /// The first reads after an attach re-deliver this consumer's
    /// un-acked entries.
    fn attach(&self) -> BoxFuture<'_, ()>;

    /// Read up to `max` entries, waiting at most `block` for new ones.
    /// An empty vec means nothing arrived in time.
    fn read(&self, max: usize, block: Duration) -> BoxFuture<'_, Vec<ChannelEntry>>;

    /// Acknowledge a processed entry so it is never delivered again.
    fn ack(&self, entry_id: &str) -> BoxFuture<'_, ()>;

    /// Drop the transport after an error. Un-acked entries stay pending.
    fn reset(&self) -> BoxFuture<'_, ()>;

    /// Id of the newest entry on the topic, acked or not. `None` when empty.
    fn latest_id(&self) -> BoxFuture<'_, Option<String>>;
}

impl<T: EventChannel> EventChannel for Arc<T> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn publish(&self, body: String) -> BoxFuture<'_, String> {
        (**self).publish(body)
    }

    fn attach(&self) -> BoxFuture<'_, ()> {
        (**self).attach()
    }

    fn read(&self, max: usize, block: Duration) -> BoxFuture<'_, Vec<ChannelEntry>> {
        (**self).read(max, block)
    }

    fn ack(&self, entry_id: &str) -> BoxFuture<'_, ()> {
        (**self).ack(entry_id)
    }

    fn reset(&self) -> BoxFuture<'_, ()> {
        (**self).reset()
    }

    fn latest_id(&self) -> BoxFuture<'_, Option<String>> {
        (**self).latest_id()
    }
}

// =============================================================================
// Entry id helpers
// =============================================================================

/// Compare two stream entry ids numerically.
///
/// Ids are formatted as `{timestamp}-{sequence}` (e.g., "1234567890123-0").
/// Lexicographic comparison is wrong for these ("9-0" > "10-0").
pub fn compare_stream_ids(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> (u64, u64) {
        match s.split_once('-') {
            Some((ts, seq)) => (ts.parse().unwrap_or(0), seq.parse().unwrap_or(0)),
            // "0" start marker or malformed
            None => (s.parse().unwrap_or(0), 0),
        }
    };

    parse(a).cmp(&parse(b))
}

/// Millisecond timestamp part of an entry id. `None` for "0" or malformed ids.
pub fn parse_stream_id_timestamp(stream_id: &str) -> Option<u64> {
    let (ts, seq) = stream_id.split_once('-')?;
    if seq.contains('-') {
        return None;
    }
    ts.parse().ok()
}

/// Time lag in milliseconds between two entry ids.
///
/// Returns `None` if either id can't be parsed, 0 if `cursor` is ahead.
pub fn calculate_lag_ms(cursor: &str, latest: &str) -> Option<u64> {
    let cursor_ts = parse_stream_id_timestamp(cursor)?;
    let latest_ts = parse_stream_id_timestamp(latest)?;
    Some(latest_ts.saturating_sub(cursor_ts))
}

/// Milliseconds between an entry's id timestamp and now.
pub fn entry_age_ms(entry_id: &str) -> Option<u64> {
    let ts = parse_stream_id_timestamp(entry_id)?;
    Some(epoch_millis().saturating_sub(ts))
}

pub(crate) fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
