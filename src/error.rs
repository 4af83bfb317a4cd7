// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for platform replication.
//!
//! Errors are categorized by the propagation channel they come from and
//! by how the caller is expected to react.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Redis` | Yes | Event channel transport errors (connect, XADD, XREADGROUP) |
//! | `Channel` | Yes | Channel not attached, injected faults |
//! | `Http` | Yes | Push / bulk sync transport errors |
//! | `HttpStatus` | Yes | Non-success response from a peer service |
//! | `Timeout` | Yes | Bounded call exceeded its deadline |
//! | `CircuitOpen` | Yes | Push circuit is open, call not attempted |
//! | `NotFound` | No | Referenced platform / command does not exist |
//! | `MalformedMessage` | No | Undecodable event or payload |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Engine state machine violation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Push and publish failures are *advisory*: the caller logs them and
//! moves on, whatever [`ReplicationError::is_retryable()`] says. Only the
//! subscriber treats retryable errors as must-eventually-succeed and
//! reconnects with backoff.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Redis connection or command error on the event channel.
    #[error("Redis error ({operation}): {message}")]
    Redis {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Event channel unusable (not attached, or a simulated fault).
    #[error("Channel error ({topic}): {message}")]
    Channel { topic: String, message: String },

    /// HTTP transport failure talking to the other service.
    #[error("HTTP error ({operation}): {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The other service answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// A bounded operation did not finish in time.
    #[error("Timed out after {timeout_ms}ms ({operation})")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The push circuit breaker rejected the call.
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    /// A referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Event or payload could not be decoded.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a Redis error from a redis::RedisError
    pub fn redis(operation: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Redis {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a Redis error without source
    pub fn redis_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Redis {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an HTTP transport error.
    pub fn http(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            operation: operation.into(),
            source,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Platform lookup by local id failed.
    pub fn platform_not_found(local_id: u64) -> Self {
        Self::NotFound {
            entity: "Platform",
            id: local_id.to_string(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Redis { .. } => true,
            Self::Channel { .. } => true,
            Self::Http { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } => true,
            Self::CircuitOpen(_) => true,
            Self::NotFound { .. } => false,
            Self::MalformedMessage(_) => false, // Poison message, never gets better
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Redis { .. } => "redis",
            Self::Channel { .. } => "channel",
            Self::Http { .. } => "http",
            Self::HttpStatus { .. } => "http_status",
            Self::Timeout { .. } => "timeout",
            Self::CircuitOpen(_) => "circuit_open",
            Self::NotFound { .. } => "not_found",
            Self::MalformedMessage(_) => "malformed",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<redis::RedisError> for ReplicationError {
    fn from(e: redis::RedisError) -> Self {
        Self::redis("unknown", e)
    }
}

impl From<reqwest::Error> for ReplicationError {
    fn from(e: reqwest::Error) -> Self {
        Self::http("unknown", e)
    }
}

impl From<serde_json::Error> for ReplicationError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedMessage(e.to_string())
    }
}
