//! HTTP routes.
//!
//! - `GET /api/dogs?page=N` - records of page N (default 1) as a JSON array
//! - `GET /api/stats` - cache and scheduler statistics
//! - `POST /api/refresh` - request an out-of-cycle refresh

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kennel_core::{PageNumber, ValidRecord};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::constants::DEFAULT_PAGE;
use crate::scheduler::TriggerAck;
use crate::service::{KennelService, StatsView};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<PageNumber>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: TriggerAck,
}

pub fn create_router(service: Arc<KennelService>) -> Router {
    Router::new()
        .route("/api/dogs", get(list_page))
        .route("/api/stats", get(stats))
        .route("/api/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn list_page(
    State(service): State<Arc<KennelService>>,
    Query(query): Query<PageQuery>,
) -> Json<Vec<ValidRecord>> {
    let page = service.get_page(query.page.unwrap_or(DEFAULT_PAGE)).await;
    Json(page.records)
}

async fn stats(State(service): State<Arc<KennelService>>) -> Json<StatsView> {
    Json(service.get_stats().await)
}

async fn refresh(State(service): State<Arc<KennelService>>) -> impl IntoResponse {
    let outcome = service.request_refresh();
    let status = match outcome {
        TriggerAck::Started => StatusCode::ACCEPTED,
        TriggerAck::Skipped => StatusCode::OK,
        TriggerAck::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(RefreshResponse { outcome }))
}
