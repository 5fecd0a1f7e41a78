use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Common error types used across the application.
///
/// Client-facing variants carry a stable machine-readable code so callers can
/// branch on failures without parsing messages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Notification content is missing when template is not specified")]
    MissingContent,

    #[error("Invalid notification type <{0}>")]
    InvalidNotificationType(String),

    #[error("Template slug <{0}> is invalid")]
    InvalidSlug(String),

    #[error("Template content is invalid: {0}")]
    InvalidTemplateContent(String),

    #[error("Invalid cron expression <{0}>")]
    InvalidCron(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown task <{0}>. Check if it is registered")]
    UnknownTask(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code surfaced in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => "internal_error",
            AppError::MissingContent => "missing_notification_content",
            AppError::InvalidNotificationType(_) => "invalid_notification_type",
            AppError::InvalidSlug(_) => "invalid_template_slug",
            AppError::InvalidTemplateContent(_) => "invalid_template_content",
            AppError::InvalidCron(_) => "invalid_cron",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::UnknownTask(_) => "unknown_task",
            AppError::Conflict(_) => "resource_conflict",
            AppError::Config(_) => "improperly_configured",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::MissingContent
            | AppError::InvalidNotificationType(_)
            | AppError::InvalidSlug(_)
            | AppError::InvalidTemplateContent(_)
            | AppError::InvalidCron(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::UnknownTask(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_codes() {
        assert_eq!(AppError::MissingContent.code(), "missing_notification_content");
        assert_eq!(
            AppError::InvalidNotificationType("sms".into()).code(),
            "invalid_notification_type"
        );
        assert_eq!(AppError::Conflict("dup".into()).code(), "resource_conflict");
        assert_eq!(AppError::NotFound("x".into()).code(), "not_found");
    }

    #[test]
    fn test_statuses() {
        assert_eq!(AppError::MissingContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Config("gap".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
