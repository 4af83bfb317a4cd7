//! Platform service: owns Platforms and replicates each create to the
//! commands service (HTTP push + event publish).

use axum::http::Request;
use clap::Parser;
use platform_replication::api::source_router;
use platform_replication::channel::RedisChannel;
use platform_replication::config::{load_json, SourceConfig};
use platform_replication::model::NewPlatform;
use platform_replication::resilience::RetryConfig;
use platform_replication::source::SourceService;
use platform_replication::store::RecordStore;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Platform service (replication source).
#[derive(Parser, Debug)]
#[command(name = "platform-service")]
#[command(
    about = "Platform source service with replication to the commands service",
    long_about = None
)]
struct Args {
    /// JSON config file. Flags below override it.
    #[arg(long, env = "PLATFORM_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address.
    #[arg(long, env = "PLATFORM_BIND_ADDR")]
    bind: Option<String>,

    /// Replica ingest endpoint for the synchronous push.
    #[arg(long, env = "COMMANDS_INGEST_URL")]
    ingest_url: Option<String>,

    /// Event broker URL.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Event topic (stream key).
    #[arg(long, env = "EVENT_TOPIC")]
    topic: Option<String>,

    /// JSON array of Platforms written to an empty store at startup.
    #[arg(long, env = "PLATFORM_SEED")]
    seed: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<SourceConfig> {
        let mut config = match &self.config {
            Some(path) => load_json::<SourceConfig>(path)?,
            None => SourceConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.http.bind_addr = bind;
        }
        if self.ingest_url.is_some() {
            config.push.ingest_url = self.ingest_url;
        }
        if let Some(redis_url) = self.redis_url {
            config.channel.redis_url = redis_url;
        }
        if let Some(topic) = self.topic {
            config.channel.topic = topic;
        }
        if let Some(path) = &self.seed {
            config.seed = load_json::<Vec<NewPlatform>>(path)?;
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

    let channel = RedisChannel::new(config.channel.clone())?;
    if let Err(e) = channel.connect(&RetryConfig::startup()).await {
        // Publishing reconnects lazily; creates still succeed meanwhile.
        tracing::warn!(error = %e, "Event broker unavailable at startup");
    }

    let store = Arc::new(RecordStore::new());
    let service = Arc::new(SourceService::from_config(store, channel, &config)?);
    service.seed_platforms(&config.seed).await;

    let app = source_router(service).layer(TraceLayer::new_for_http().make_span_with(
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
    tracing::info!(addr = %config.http.bind_addr, "starting platform service");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("platform service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
