//! Source service routes.
//!
//! - `GET /health`
//! - `GET /api/platforms` - full Platform set as wire payloads (bulk sync responder)
//! - `GET /api/platforms/{id}` - one Platform by local id
//! - `POST /api/platforms` - create, then push and publish

use super::ApiError;
use crate::channel::EventChannel;
use crate::model::{NewPlatform, Platform, PlatformPayload};
use crate::source::SourceService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn source_router<C: EventChannel>(service: Arc<SourceService<C>>) -> Router {
    Router::new()
        .route("/health", get(health::<C>))
        .route("/api/platforms", get(list_platforms::<C>).post(create_platform::<C>))
        .route("/api/platforms/{id}", get(get_platform::<C>))
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct SourceHealth {
    status: &'static str,
    platform_count: usize,
    push_enabled: bool,
    topic: String,
}

async fn health<C: EventChannel>(
    State(service): State<Arc<SourceService<C>>>,
) -> Json<SourceHealth> {
    Json(SourceHealth {
        status: "ok",
        platform_count: service.store().count().await,
        push_enabled: service.pusher().is_some(),
        topic: service.publisher().channel().topic().to_string(),
    })
}

async fn list_platforms<C: EventChannel>(
    State(service): State<Arc<SourceService<C>>>,
) -> Json<Vec<PlatformPayload>> {
    Json(service.bulk_sync_responder().snapshot().await)
}

async fn get_platform<C: EventChannel>(
    State(service): State<Arc<SourceService<C>>>,
    Path(id): Path<u64>,
) -> Result<Json<Platform>, ApiError> {
    service
        .store()
        .get_platform(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("platform {}", id)))
}

async fn create_platform<C: EventChannel>(
    State(service): State<Arc<SourceService<C>>>,
    Json(new): Json<NewPlatform>,
) -> (StatusCode, Json<Platform>) {
    let created = service.create_platform(new).await;
    (StatusCode::CREATED, Json(created.platform))
}
