//! Replica service routes.
//!
//! - `GET /health` - engine health check
//! - `POST /api/c/platforms` - synchronous push ingest (idempotent upsert)
//! - `GET /api/c/platforms`
//! - `GET|POST /api/c/platforms/{platform_id}/commands`
//! - `GET /api/c/platforms/{platform_id}/commands/{command_id}`

use super::ApiError;
use crate::channel::EventChannel;
use crate::coordinator::{HealthCheck, ReplicaEngine};
use crate::metrics;
use crate::model::{Command, IngestAck, NewCommand, Platform, PlatformPayload};
use crate::store::RecordStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

type Engine<C> = Arc<ReplicaEngine<RecordStore, C>>;

pub fn replica_router<C: EventChannel>(engine: Engine<C>) -> Router {
    Router::new()
        .route("/health", get(health::<C>))
        .route("/api/c/platforms", get(list_platforms::<C>).post(ingest_platform::<C>))
        .route(
            "/api/c/platforms/{platform_id}/commands",
            get(list_commands::<C>).post(create_command::<C>),
        )
        .route(
            "/api/c/platforms/{platform_id}/commands/{command_id}",
            get(get_command::<C>),
        )
        .with_state(engine)
}

async fn health<C: EventChannel>(
    State(engine): State<Engine<C>>,
) -> (StatusCode, Json<HealthCheck>) {
    let health = engine.health_check().await;
    let status = if health.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn ingest_platform<C: EventChannel>(
    State(engine): State<Engine<C>>,
    Json(payload): Json<PlatformPayload>,
) -> Json<IngestAck> {
    let external_id = payload.external_id.clone();
    let outcome = engine.store().upsert_platform(payload).await;
    let ack = IngestAck::from(outcome);

    if ack.created {
        metrics::record_ingest("inserted");
        info!(%external_id, local_id = ack.local_id, "Platform ingested via push");
    } else {
        metrics::record_ingest("unchanged");
    }
    Json(ack)
}

async fn list_platforms<C: EventChannel>(State(engine): State<Engine<C>>) -> Json<Vec<Platform>> {
    Json(engine.store().list_platforms().await)
}

async fn list_commands<C: EventChannel>(
    State(engine): State<Engine<C>>,
    Path(platform_id): Path<u64>,
) -> Result<Json<Vec<Command>>, ApiError> {
    Ok(Json(engine.store().list_commands(platform_id).await?))
}

async fn create_command<C: EventChannel>(
    State(engine): State<Engine<C>>,
    Path(platform_id): Path<u64>,
    Json(new): Json<NewCommand>,
) -> Result<(StatusCode, Json<Command>), ApiError> {
    let command = engine.store().create_command(platform_id, new).await?;
    Ok((StatusCode::CREATED, Json(command)))
}

async fn get_command<C: EventChannel>(
    State(engine): State<Engine<C>>,
    Path((platform_id, command_id)): Path<(u64, u64)>,
) -> Result<Json<Command>, ApiError> {
    engine
        .store()
        .get_command(platform_id, command_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("command {} of platform {}", command_id, platform_id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::ReplicaConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const KAFKA: &str = r#"{"id":"X1","name":"Kafka","publisher":"Confluent","cost":"Free"}"#;

    fn app() -> (Router, Engine<MemoryChannel>) {
        let engine = Arc::new(
            ReplicaEngine::new(
                ReplicaConfig::for_testing(),
                Arc::new(RecordStore::new()),
                Arc::new(MemoryChannel::new("platforms")),
            )
            .unwrap(),
        );
        (replica_router(engine.clone()), engine)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let (app, engine) = app();

        let first = app.clone().oneshot(post("/api/c/platforms", KAFKA)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = body_json(first).await;
        assert_eq!(first["created"], true);
        assert_eq!(first["local_id"], 1);

        let second = body_json(app.oneshot(post("/api/c/platforms", KAFKA)).await.unwrap()).await;
        assert_eq!(second["created"], false);
        assert_eq!(second["local_id"], 1);

        assert_eq!(engine.store().count().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_body() {
        let (app, engine) = app();
        let response = app
            .oneshot(post("/api/c/platforms", r#"{"name":"no id"}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(engine.store().count().await, 0);
    }

    #[tokio::test]
    async fn test_commands_for_known_and_unknown_platform() {
        let (app, _) = app();
        app.clone().oneshot(post("/api/c/platforms", KAFKA)).await.unwrap();

        let created = app
            .clone()
            .oneshot(post(
                "/api/c/platforms/1/commands",
                r#"{"how_to":"List topics","command_line":"kafka-topics --list"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let command = body_json(created).await;
        assert_eq!(command["platform_local_id"], 1);
        let command_id = command["id"].as_u64().unwrap();

        let fetched = app
            .clone()
            .oneshot(
                Request::get(format!("/api/c/platforms/1/commands/{}", command_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);

        let listed = app
            .clone()
            .oneshot(Request::get("/api/c/platforms/1/commands").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(listed).await.as_array().unwrap().len(), 1);

        let missing = app
            .clone()
            .oneshot(post(
                "/api/c/platforms/7/commands",
                r#"{"how_to":"x","command_line":"y"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let missing = app
            .oneshot(Request::get("/api/c/platforms/7/commands").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_not_ready_before_start() {
        let (app, engine) = app();
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["state"], "Created");

        engine.start().await.unwrap();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        engine.shutdown().await;
    }
}
