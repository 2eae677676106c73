use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clubsync_core::diff::DiffReport;
use clubsync_core::sync::SyncStatus;
use clubsync_core::{Reconciler, Strategy, SyncCoordinator};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, verify_admin_token};
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    coordinator: SyncCoordinator,
    reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        coordinator: SyncCoordinator,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            config,
            coordinator,
            reconciler,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(trigger_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/last-sync-time", get(last_sync_time))
        .route("/sync/compare", get(compare))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    verify_admin_token(token, &state.config.admin_token)?;
    Ok(next.run(request).await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TriggerRequest {
    strategy: Option<String>,
    message: Option<String>,
    /// Hold the response until the job finishes
    wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    job_id: u64,
    strategy: Strategy,
    enqueued_at: DateTime<Utc>,
    queue_length: usize,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Response, AppError> {
    let strategy = match request.strategy.as_deref() {
        None => Strategy::Merge,
        Some(value) => value.parse::<Strategy>().map_err(AppError::bad_request)?,
    };

    let job = state.coordinator.trigger(strategy, request.message);
    tracing::info!(
        endpoint = "sync_trigger",
        job_id = job.id,
        %strategy,
        wait = request.wait,
        "Accepted sync trigger"
    );

    if request.wait {
        let result = job.wait().await?;
        return Ok(Json(result).into_response());
    }

    let status = state.coordinator.status().await;
    let body = TriggerResponse {
        job_id: job.id,
        strategy: job.strategy,
        enqueued_at: job.enqueued_at,
        queue_length: status.queue_length,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.coordinator.status().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LastSyncTimeResponse {
    last_sync_time: Option<DateTime<Utc>>,
}

async fn last_sync_time(State(state): State<AppState>) -> Json<LastSyncTimeResponse> {
    Json(LastSyncTimeResponse {
        last_sync_time: state.coordinator.last_sync_time().await,
    })
}

async fn compare(State(state): State<AppState>) -> Result<Json<DiffReport>, AppError> {
    let report = state.reconciler.compare().await?;
    tracing::info!(
        endpoint = "sync_compare",
        identical = report.stats.identical,
        different = report.stats.different,
        store_only = report.stats.store_only,
        file_only = report.stats.file_only,
        "Compared record store with snapshot"
    );
    Ok(Json(report))
}
