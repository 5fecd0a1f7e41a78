//! Notification dispatch route.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use courier_common::error::AppError;
use courier_common::types::{DispatchReceipt, NotificationRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/notifications", post(dispatch_notification))
}

/// POST /api/v1/notifications — Validate, route and enqueue one notification.
///
/// 202 means accepted for delivery, not delivered: the receipt's id tracks
/// the queued job.
async fn dispatch_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<(StatusCode, Json<DispatchReceipt>), AppError> {
    let receipt = state.dispatcher.dispatch(request).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}
