//! Synchronous propagation: POST a new Platform to the replica's ingest
//! endpoint from inside the create request.
//!
//! Every call is bounded (per-attempt timeout, bounded attempts) and goes
//! through the `sync_push` circuit breaker. Any failure comes back as an
//! `Err`; the source logs it and still answers the create request.

use crate::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, CircuitStats};
use crate::config::PushConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::model::{IngestAck, Platform, PlatformPayload};
use crate::resilience::{retry_with_backoff, RetryConfig};
use std::time::Instant;
use tracing::{debug, warn};

/// Name of the push circuit (metrics label).
pub const PUSH_CIRCUIT: &str = "sync_push";

pub struct SyncPusher {
    client: reqwest::Client,
    ingest_url: String,
    retry: RetryConfig,
    circuit: CircuitBreaker,
}

impl SyncPusher {
    pub fn new(ingest_url: impl Into<String>, config: &PushConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout_duration())
            .build()
            .map_err(|e| ReplicationError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ingest_url: ingest_url.into(),
            retry: config.retry_config(),
            circuit: CircuitBreaker::new(PUSH_CIRCUIT, CircuitConfig::from_push(config)),
        })
    }

    /// Build a pusher if an ingest URL is configured.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>> {
        config
            .ingest_url
            .as_deref()
            .map(|url| Self::new(url, config))
            .transpose()
    }

    pub fn ingest_url(&self) -> &str {
        &self.ingest_url
    }

    pub fn circuit_stats(&self) -> CircuitStats {
        self.circuit.stats()
    }

    /// Push one Platform. Returns the replica's acknowledgement.
    pub async fn push(&self, platform: &Platform) -> Result<IngestAck> {
        let payload = platform.to_payload();
        let start = Instant::now();

        let result = self
            .circuit
            .call(|| retry_with_backoff(&self.retry, "sync_push", || self.send_once(&payload)))
            .await;

        let elapsed = start.elapsed();
        match result {
            Ok(ack) => {
                metrics::record_push("delivered", elapsed);
                debug!(
                    external_id = %payload.external_id,
                    replica_local_id = ack.local_id,
                    created = ack.created,
                    "Pushed Platform to replica"
                );
                Ok(ack)
            }
            Err(CircuitError::Rejected) => {
                metrics::record_push("rejected", elapsed);
                warn!(external_id = %payload.external_id, "Push skipped, circuit open");
                Err(ReplicationError::CircuitOpen(PUSH_CIRCUIT.to_string()))
            }
            Err(CircuitError::Inner(e)) => {
                metrics::record_push("failed", elapsed);
                metrics::record_error("push", e.kind());
                warn!(
                    external_id = %payload.external_id,
                    url = %self.ingest_url,
                    error = %e,
                    "Push to replica failed"
                );
                Err(e)
            }
        }
    }

    async fn send_once(&self, payload: &PlatformPayload) -> Result<IngestAck> {
        let response = self
            .client
            .post(&self.ingest_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ReplicationError::http("sync_push", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationError::HttpStatus {
                url: self.ingest_url.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<IngestAck>()
            .await
            .map_err(|e| ReplicationError::http("sync_push decode", e))
    }
}
