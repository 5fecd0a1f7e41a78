//! Template CRUD routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};

use courier_common::error::AppError;
use courier_common::types::Template;
use courier_dispatch::template::{CreateTemplateParams, TemplateService, UpdateTemplateParams};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/templates", post(create_template))
        .route("/api/v1/templates", get(list_templates))
        .route("/api/v1/templates/{slug}", get(get_template))
        .route("/api/v1/templates/{slug}", patch(update_template))
        .route("/api/v1/templates/{slug}", delete(delete_template))
}

/// POST /api/v1/templates — Create a new notification template.
async fn create_template(
    State(state): State<AppState>,
    Json(params): Json<CreateTemplateParams>,
) -> Result<(StatusCode, Json<Template>), AppError> {
    let template = TemplateService::create(&state.pool, &params).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /api/v1/templates — List all templates.
async fn list_templates(State(state): State<AppState>) -> Result<Json<Vec<Template>>, AppError> {
    let templates = TemplateService::list(&state.pool).await?;
    Ok(Json(templates))
}

/// GET /api/v1/templates/:slug — Fetch a single template.
async fn get_template(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Template>, AppError> {
    let template = TemplateService::get_by_slug(&state.pool, &slug).await?;
    Ok(Json(template))
}

/// PATCH /api/v1/templates/:slug — Update a template's name or content.
async fn update_template(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(params): Json<UpdateTemplateParams>,
) -> Result<Json<Template>, AppError> {
    let template = TemplateService::update_by_slug(&state.pool, &slug, &params).await?;
    Ok(Json(template))
}

/// DELETE /api/v1/templates/:slug — Delete a template.
async fn delete_template(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, AppError> {
    TemplateService::delete_by_slug(&state.pool, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}
