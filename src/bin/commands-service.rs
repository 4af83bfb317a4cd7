//! Commands service: replica of the Platform set plus locally owned
//! Commands.

use axum::http::Request;
use clap::Parser;
use platform_replication::api::replica_router;
use platform_replication::channel::RedisChannel;
use platform_replication::config::{load_json, ReplicaConfig};
use platform_replication::coordinator::ReplicaEngine;
use platform_replication::resilience::RetryConfig;
use platform_replication::store::RecordStore;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Commands service (replication target).
#[derive(Parser, Debug)]
#[command(name = "commands-service")]
#[command(about = "Commands service holding a replica of the Platform set", long_about = None)]
struct Args {
    /// JSON config file. Flags below override it.
    #[arg(long, env = "COMMANDS_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address.
    #[arg(long, env = "COMMANDS_BIND_ADDR")]
    bind: Option<String>,

    /// Source bulk sync endpoint, pulled once at startup.
    #[arg(long, env = "PLATFORM_BULK_SYNC_URL")]
    bulk_sync_url: Option<String>,

    /// Event broker URL.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Event topic (stream key).
    #[arg(long, env = "EVENT_TOPIC")]
    topic: Option<String>,

    /// Consumer group.
    #[arg(long, env = "EVENT_GROUP")]
    group: Option<String>,

    /// Consumer name inside the group.
    #[arg(long, env = "EVENT_CONSUMER")]
    consumer: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ReplicaConfig> {
        let mut config = match &self.config {
            Some(path) => load_json::<ReplicaConfig>(path)?,
            None => ReplicaConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.http.bind_addr = bind;
        }
        if self.bulk_sync_url.is_some() {
            config.bulk_sync.url = self.bulk_sync_url;
        }
        if let Some(redis_url) = self.redis_url {
            config.channel.redis_url = redis_url;
        }
        if let Some(topic) = self.topic {
            config.channel.topic = topic;
        }
        if let Some(group) = self.group {
            config.channel.group = group;
        }
        if let Some(consumer) = self.consumer {
            config.channel.consumer = consumer;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config()?;

    let channel = Arc::new(RedisChannel::new(config.channel.clone())?);
    if let Err(e) = channel.connect(&RetryConfig::startup()).await {
        // The subscriber keeps re-attaching in the background.
        tracing::warn!(error = %e, "Event broker unavailable at startup");
    }

    let store = Arc::new(RecordStore::new());
    let engine = Arc::new(ReplicaEngine::new(config.clone(), store, channel)?);
    engine.start().await?;

    let app = replica_router(Arc::clone(&engine)).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<_>| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path()
            )
        },
    ));

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr).await?;
    tracing::info!(addr = %config.http.bind_addr, "starting commands service");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    tracing::info!("commands service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
