//! Cold-start catch-up.
//!
//! The source answers with its whole Platform set; the replica pulls it
//! once at startup and upserts every entry in order. Upsert is idempotent,
//! so records that also arrive later as events are no-ops.

use crate::config::BulkSyncConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::model::PlatformPayload;
use crate::store::{RecordStore, ReplicaStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Source side: the full current Platform set as wire payloads.
#[derive(Clone)]
pub struct BulkSyncResponder {
    store: Arc<RecordStore>,
}

impl BulkSyncResponder {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Every Platform, insertion order, no paging.
    pub async fn snapshot(&self) -> Vec<PlatformPayload> {
        self.store
            .list_platforms()
            .await
            .iter()
            .map(|p| p.to_payload())
            .collect()
    }
}

/// Counts from one bulk sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSyncStats {
    pub fetched: usize,
    pub inserted: usize,
    pub unchanged: usize,
}

/// Replica side: one GET against the responder.
pub struct BulkSyncClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl BulkSyncClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReplicationError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    /// Build a client if a responder URL is configured.
    pub fn from_config(config: &BulkSyncConfig) -> Result<Option<Self>> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, config.timeout_duration()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the full set, bounded by the configured timeout.
    pub async fn fetch_all(&self) -> Result<Vec<PlatformPayload>> {
        let request = async {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| ReplicationError::http("bulk_sync", e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ReplicationError::HttpStatus {
                    url: self.url.clone(),
                    status: status.as_u16(),
                });
            }

            response
                .json::<Vec<PlatformPayload>>()
                .await
                .map_err(|e| ReplicationError::http("bulk_sync decode", e))
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ReplicationError::timeout("bulk_sync", self.timeout))?
    }

    /// Fetch and upsert every record in order.
    ///
    /// A store failure stops the run; records already applied stay applied.
    pub async fn sync_into<S: ReplicaStore + ?Sized>(&self, store: &S) -> Result<BulkSyncStats> {
        let start = Instant::now();
        let result = self.run(store).await;

        match &result {
            Ok(stats) => {
                metrics::record_bulk_sync(true, stats.fetched, stats.inserted, start.elapsed());
                info!(
                    url = %self.url,
                    fetched = stats.fetched,
                    inserted = stats.inserted,
                    unchanged = stats.unchanged,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Bulk sync complete"
                );
            }
            Err(e) => {
                metrics::record_bulk_sync(false, 0, 0, start.elapsed());
                metrics::record_error("bulk_sync", e.kind());
                warn!(url = %self.url, error = %e, "Bulk sync failed");
            }
        }
        result
    }

    async fn run<S: ReplicaStore + ?Sized>(&self, store: &S) -> Result<BulkSyncStats> {
        let platforms = self.fetch_all().await?;
        let mut stats = BulkSyncStats {
            fetched: platforms.len(),
            ..Default::default()
        };

        for payload in platforms {
            if store.upsert(payload).await?.is_inserted() {
                stats.inserted += 1;
            } else {
                stats.unchanged += 1;
            }
        }
        Ok(stats)
    }
}
