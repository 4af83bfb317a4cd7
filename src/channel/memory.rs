//! In-process event channel with fault injection.
//!
//! Same delivery contract as the Redis channel: ordered log, a single
//! consumer cursor, un-acked entries re-delivered after re-attach.
//! Faults (`pause`, `fail_reads`, `fail_publishes`) let tests simulate a
//! broker partition without a broker.

use super::{epoch_millis, ChannelEntry, EventChannel};
use crate::error::{ReplicationError, Result};
use crate::store::BoxFuture;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Debug)]
struct Slot {
    id: String,
    body: String,
    acked: bool,
}

#[derive(Debug, Default)]
struct State {
    log: Vec<Slot>,
    /// Index of the first never-delivered slot.
    cursor: usize,
    last_ts: u64,
    last_seq: u64,
    attached: bool,
    /// Pending slots are re-delivered before new ones after attach.
    replay_pending: bool,
    paused: bool,
    fail_reads: bool,
    fail_publishes: bool,
}

impl State {
    fn next_id(&mut self) -> String {
        let now = epoch_millis();
        if now > self.last_ts {
            self.last_ts = now;
            self.last_seq = 0;
        } else {
            self.last_seq += 1;
        }
        format!("{}-{}", self.last_ts, self.last_seq)
    }

    fn take_pending(&self, max: usize) -> Vec<ChannelEntry> {
        self.log[..self.cursor]
            .iter()
            .filter(|slot| !slot.acked)
            .take(max)
            .map(|slot| ChannelEntry {
                id: slot.id.clone(),
                body: slot.body.clone(),
            })
            .collect()
    }

    fn take_new(&mut self, max: usize) -> Vec<ChannelEntry> {
        let end = (self.cursor + max).min(self.log.len());
        let entries = self.log[self.cursor..end]
            .iter()
            .map(|slot| ChannelEntry {
                id: slot.id.clone(),
                body: slot.body.clone(),
            })
            .collect();
        self.cursor = end;
        entries
    }
}

/// In-memory [`EventChannel`].
#[derive(Debug)]
pub struct MemoryChannel {
    topic: String,
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// Stop delivering entries. Publishes still queue.
    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
    }

    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
        self.notify.notify_waiters();
    }

    /// Make every read fail with a channel error.
    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.lock().await.fail_reads = fail;
        self.notify.notify_waiters();
    }

    /// Make every publish fail with a channel error.
    pub async fn set_fail_publishes(&self, fail: bool) {
        self.state.lock().await.fail_publishes = fail;
    }

    /// Total entries ever published.
    pub async fn len(&self) -> usize {
        self.state.lock().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries delivered but not yet acked.
    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state.log[..state.cursor].iter().filter(|s| !s.acked).count()
    }

    /// Entries not yet delivered to the consumer.
    pub async fn backlog(&self) -> usize {
        let state = self.state.lock().await;
        state.log.len() - state.cursor
    }

    /// Published bodies in order.
    pub async fn bodies(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.log.iter().map(|s| s.body.clone()).collect()
    }

    fn channel_error(&self, message: &str) -> ReplicationError {
        ReplicationError::Channel {
            topic: self.topic.clone(),
            message: message.to_string(),
        }
    }

    async fn append(&self, body: String) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.fail_publishes {
            return Err(self.channel_error("publish failed (injected)"));
        }
        let id = state.next_id();
        state.log.push(Slot {
            id: id.clone(),
            body,
            acked: false,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(id)
    }

    /// One non-blocking pass. `Ok(None)` means nothing to deliver yet.
    async fn try_take(&self, max: usize) -> Result<Option<Vec<ChannelEntry>>> {
        let mut state = self.state.lock().await;
        if state.fail_reads {
            return Err(self.channel_error("read failed (injected)"));
        }
        if !state.attached {
            return Err(self.channel_error("not attached"));
        }
        if state.paused {
            return Ok(None);
        }

        if state.replay_pending {
            let pending = state.take_pending(max);
            if !pending.is_empty() {
                return Ok(Some(pending));
            }
            state.replay_pending = false;
        }

        let entries = state.take_new(max);
        Ok(if entries.is_empty() { None } else { Some(entries) })
    }

    async fn take(&self, max: usize, block: Duration) -> Result<Vec<ChannelEntry>> {
        let max = max.max(1);
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // Register before checking so a publish between the check and
            // the wait is not missed.
            let notified = self.notify.notified();

            if let Some(entries) = self.try_take(max).await? {
                return Ok(entries);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn mark_acked(&self, entry_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.log.iter_mut().find(|s| s.id == entry_id) {
            slot.acked = true;
        }
    }
}

impl EventChannel for MemoryChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, body: String) -> BoxFuture<'_, String> {
        Box::pin(self.append(body))
    }

    fn attach(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.fail_reads {
                return Err(self.channel_error("attach failed (injected)"));
            }
            state.attached = true;
            state.replay_pending = true;
            Ok(())
        })
    }

    fn read(&self, max: usize, block: Duration) -> BoxFuture<'_, Vec<ChannelEntry>> {
        Box::pin(self.take(max, block))
    }

    fn ack(&self, entry_id: &str) -> BoxFuture<'_, ()> {
        let entry_id = entry_id.to_string();
        Box::pin(async move {
            self.mark_acked(&entry_id).await;
            Ok(())
        })
    }

    fn reset(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().await.attached = false;
            Ok(())
        })
    }

    fn latest_id(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            if state.fail_reads {
                return Err(self.channel_error("latest id failed (injected)"));
            }
            Ok(state.log.last().map(|slot| slot.id.clone()))
        })
    }
}
