//! Admin-defined periodic tasks.
//!
//! Administrators bind a registered bulk job to a cron schedule; the worker
//! scheduler picks enabled rows up on its next tick. Everything user-supplied
//! is validated at creation time: the job name must be registered as
//! periodic-capable, the cron must parse, and the kwargs must name an
//! existing template.

use croner::Cron;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::PeriodicTask;

use crate::job::PERIODIC_CAPABLE_JOBS;
use crate::template::TemplateService;

/// Parameters for creating a periodic task.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreatePeriodicTaskParams {
    /// Registered job name, e.g. `send_templated_emails`.
    pub task: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cron: String,
    pub kwargs: serde_json::Value,
    #[serde(default)]
    pub one_off: bool,
}

/// Service layer for periodic-task administration.
pub struct PeriodicTaskService;

impl PeriodicTaskService {
    /// Job names an administrator may schedule.
    pub fn registered_jobs() -> &'static [&'static str] {
        PERIODIC_CAPABLE_JOBS
    }

    /// Create a new periodic task after validating every moving part.
    pub async fn create(
        pool: &PgPool,
        params: &CreatePeriodicTaskParams,
    ) -> Result<PeriodicTask, AppError> {
        if !PERIODIC_CAPABLE_JOBS.contains(&params.task.as_str()) {
            return Err(AppError::UnknownTask(params.task.clone()));
        }
        Self::validate_cron(&params.cron)?;

        let template_slug = Self::required_kwarg(&params.kwargs, "template_slug")?;
        Self::required_kwarg(&params.kwargs, "email_subject")?;
        TemplateService::get_by_slug(pool, &template_slug).await?;

        let task: PeriodicTask = sqlx::query_as(
            r#"
            INSERT INTO periodic_tasks (id, task, name, description, cron, kwargs, one_off, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.task)
        .bind(&params.name)
        .bind(&params.description)
        .bind(&params.cron)
        .bind(&params.kwargs)
        .bind(params.one_off)
        .fetch_one(pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, &params.name))?;

        tracing::info!(task = %task.task, name = %task.name, cron = %task.cron, "Periodic task created");
        Ok(task)
    }

    /// All stored periodic tasks, for the admin panel.
    pub async fn list(pool: &PgPool) -> Result<Vec<PeriodicTask>, AppError> {
        let tasks: Vec<PeriodicTask> =
            sqlx::query_as("SELECT * FROM periodic_tasks ORDER BY created_at DESC")
                .fetch_all(pool)
                .await?;
        Ok(tasks)
    }

    /// Enabled tasks, as consumed by the worker scheduler.
    pub async fn list_enabled(pool: &PgPool) -> Result<Vec<PeriodicTask>, AppError> {
        let tasks: Vec<PeriodicTask> =
            sqlx::query_as("SELECT * FROM periodic_tasks WHERE enabled = true")
                .fetch_all(pool)
                .await?;
        Ok(tasks)
    }

    /// Disable a task (used for one-off tasks after they fire).
    pub async fn disable(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE periodic_tasks SET enabled = false WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Parse a cron expression, surfacing a client error on failure.
    pub fn validate_cron(expr: &str) -> Result<Cron, AppError> {
        Cron::new(expr)
            .parse()
            .map_err(|_| AppError::InvalidCron(expr.to_string()))
    }

    fn required_kwarg(kwargs: &serde_json::Value, key: &str) -> Result<String, AppError> {
        kwargs
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation(format!("kwargs is missing required key <{key}>")))
    }

    fn map_unique_violation(error: sqlx::Error, name: &str) -> AppError {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Periodic task <{name}> already exists"))
            }
            _ => AppError::from(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cron_parses() {
        PeriodicTaskService::validate_cron("0 19 * * FRI").unwrap();
        PeriodicTaskService::validate_cron("*/5 * * * *").unwrap();
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let err = PeriodicTaskService::validate_cron("every friday").unwrap_err();
        assert_eq!(err.code(), "invalid_cron");
    }

    #[test]
    fn test_required_kwargs() {
        let kwargs = serde_json::json!({"template_slug": "promo", "email_subject": "Hi"});
        assert_eq!(
            PeriodicTaskService::required_kwarg(&kwargs, "template_slug").unwrap(),
            "promo"
        );
        let err =
            PeriodicTaskService::required_kwarg(&serde_json::json!({}), "template_slug")
                .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_registered_jobs_contains_templated_send() {
        assert!(
            PeriodicTaskService::registered_jobs().contains(&crate::job::SEND_TEMPLATED_EMAILS)
        );
    }
}
