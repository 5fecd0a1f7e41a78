//! Background task administration routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_common::error::AppError;
use courier_common::types::PeriodicTask;
use courier_dispatch::job::{EnqueueOptions, EnqueueOutcome, JobKind};
use courier_dispatch::periodic::{CreatePeriodicTaskParams, PeriodicTaskService};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/tasks", get(list_registered_tasks))
        .route("/api/v1/tasks/periodic", get(list_periodic_tasks))
        .route("/api/v1/tasks/periodic", post(create_periodic_task))
        .route("/api/v1/tasks/digest", post(trigger_digest))
}

/// GET /api/v1/tasks — Job names that may be bound to a schedule.
async fn list_registered_tasks() -> Json<serde_json::Value> {
    Json(json!({"tasks": PeriodicTaskService::registered_jobs()}))
}

/// GET /api/v1/tasks/periodic — List all configured periodic tasks.
async fn list_periodic_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<PeriodicTask>>, AppError> {
    let tasks = PeriodicTaskService::list(&state.pool).await?;
    Ok(Json(tasks))
}

/// POST /api/v1/tasks/periodic — Bind a registered job to a cron schedule.
async fn create_periodic_task(
    State(state): State<AppState>,
    Json(params): Json<CreatePeriodicTaskParams>,
) -> Result<(StatusCode, Json<PeriodicTask>), AppError> {
    let task = PeriodicTaskService::create(&state.pool, &params).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Default, Deserialize)]
struct TriggerDigestParams {
    /// Bypass a held lock. Operator override for a stuck digest run.
    #[serde(default)]
    force: bool,
}

/// POST /api/v1/tasks/digest — Kick off a digest run outside its schedule.
async fn trigger_digest(
    State(state): State<AppState>,
    params: Option<Json<TriggerDigestParams>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    let outcome = state
        .enqueuer
        .enqueue(
            JobKind::SendDigestToSubscribers { chunk: None },
            EnqueueOptions {
                queue: None,
                force: params.force,
            },
        )
        .await?;

    let body = match outcome {
        EnqueueOutcome::Queued { id, queue } => json!({"status": "queued", "id": id, "queue": queue}),
        EnqueueOutcome::Skipped => json!({"status": "skipped", "reason": "a digest run is already in progress"}),
    };
    Ok((StatusCode::ACCEPTED, Json(body)))
}
