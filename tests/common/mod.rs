//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Redis testcontainer setup
//! - Mock ReplicaStore recording every upsert
//! - Message, HTTP server, and polling helpers

#![allow(dead_code)]

pub mod containers;
pub mod mock_store;

pub use containers::*;
pub use mock_store::*;

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

/// Serialized `Platform_Published` message, as the source publishes it.
pub fn published(id: &str, name: &str, publisher: &str, cost: &str) -> String {
    serde_json::json!({
        "event": "Platform_Published",
        "id": id,
        "name": name,
        "publisher": publisher,
        "cost": cost,
    })
    .to_string()
}

/// Serve a router on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

/// Poll `check` every 10ms until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
