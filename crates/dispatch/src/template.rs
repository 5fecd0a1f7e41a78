//! Notification template storage and rendering.
//!
//! Templates are Postgres rows keyed by slug; content is validated against
//! the template engine on write so workers never pick up an unrenderable
//! template. Rendering itself is delegated to the engine and kept behind this
//! service.

use std::sync::LazyLock;

use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::Template;

static SLUG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-\w]+$").unwrap());

/// Slug of the template the weekly digest is rendered from.
pub const WEEKLY_DIGEST_SLUG: &str = "weekly-digest";

const WEEKLY_DIGEST_CONTENT: &str = "\
<h1>Hello, {{ name }}!</h1>
<p>Here is what we picked for you this week:</p>
<ul>
{% for item in recommendations %}<li>{{ item.title }}</li>
{% endfor %}</ul>
";

/// Parameters for creating a template.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateTemplateParams {
    pub name: String,
    pub slug: String,
    pub content: String,
}

/// Parameters for updating a template. Omitted fields are left unchanged.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpdateTemplateParams {
    pub name: Option<String>,
    pub content: Option<String>,
}

/// Service layer for template CRUD and rendering.
pub struct TemplateService;

impl TemplateService {
    /// Create a new template. The slug must be unique.
    pub async fn create(pool: &PgPool, params: &CreateTemplateParams) -> Result<Template, AppError> {
        Self::validate_slug(&params.slug)?;
        Self::validate_content(&params.content)?;

        let template: Template = sqlx::query_as(
            r#"
            INSERT INTO templates (id, name, slug, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.name)
        .bind(&params.slug)
        .bind(&params.content)
        .fetch_one(pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, &params.slug))?;

        tracing::info!(slug = %template.slug, "Template created");
        Ok(template)
    }

    /// List all stored templates, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Template>, AppError> {
        let templates: Vec<Template> =
            sqlx::query_as("SELECT * FROM templates ORDER BY created_at DESC")
                .fetch_all(pool)
                .await?;
        Ok(templates)
    }

    /// Fetch a template by its slug.
    pub async fn get_by_slug(pool: &PgPool, slug: &str) -> Result<Template, AppError> {
        let template: Template = sqlx::query_as("SELECT * FROM templates WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template <{slug}> not found")))?;
        Ok(template)
    }

    /// Update a template's name and/or content by slug.
    pub async fn update_by_slug(
        pool: &PgPool,
        slug: &str,
        params: &UpdateTemplateParams,
    ) -> Result<Template, AppError> {
        Self::validate_slug(slug)?;
        if let Some(content) = &params.content {
            Self::validate_content(content)?;
        }

        let existing = Self::get_by_slug(pool, slug).await?;
        let name = params.name.clone().unwrap_or(existing.name);
        let content = params.content.clone().unwrap_or(existing.content);

        let template: Template = sqlx::query_as(
            r#"
            UPDATE templates
            SET name = $1, content = $2, updated_at = now()
            WHERE slug = $3
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&content)
        .bind(slug)
        .fetch_one(pool)
        .await?;

        tracing::info!(slug, "Template updated");
        Ok(template)
    }

    /// Delete a template by slug. Unknown slugs are a not-found error.
    pub async fn delete_by_slug(pool: &PgPool, slug: &str) -> Result<(), AppError> {
        Self::validate_slug(slug)?;
        let result = sqlx::query("DELETE FROM templates WHERE slug = $1")
            .bind(slug)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Template <{slug}> not found")));
        }
        tracing::info!(slug, "Template deleted");
        Ok(())
    }

    /// Create the built-in weekly-digest template if it does not exist yet.
    ///
    /// Called by the bulk digest job before fanning out, so a fresh
    /// deployment can send digests without manual template setup.
    pub async fn ensure_weekly_digest_template(pool: &PgPool) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, name, slug, content)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind("Weekly Digest")
        .bind(WEEKLY_DIGEST_SLUG)
        .bind(WEEKLY_DIGEST_CONTENT)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Render template content against a context.
    pub fn render(
        content: &str,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, AppError> {
        let env = minijinja::Environment::new();
        let template = env
            .template_from_str(content)
            .map_err(|e| AppError::InvalidTemplateContent(e.to_string()))?;
        template
            .render(minijinja::Value::from_serialize(context))
            .map_err(|e| AppError::InvalidTemplateContent(e.to_string()))
    }

    /// Reject content the template engine cannot parse.
    pub fn validate_content(content: &str) -> Result<(), AppError> {
        let env = minijinja::Environment::new();
        env.template_from_str(content)
            .map_err(|e| AppError::InvalidTemplateContent(e.to_string()))?;
        Ok(())
    }

    fn validate_slug(slug: &str) -> Result<(), AppError> {
        if !SLUG_REGEX.is_match(slug) {
            return Err(AppError::InvalidSlug(slug.to_string()));
        }
        Ok(())
    }

    fn map_unique_violation(error: sqlx::Error, slug: &str) -> AppError {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Template <{slug}> already exists"))
            }
            _ => AppError::from(error),
        }
    }
}
