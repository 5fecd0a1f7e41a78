//! Top-level notification dispatch: validate, route, enqueue.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{
    DispatchReceipt, NotificationPayload, NotificationRequest, NotificationType,
};

use crate::job::{EnqueueOptions, Enqueuer, JobKind};
use crate::router::PriorityRouter;
use crate::template::TemplateService;

/// Template-existence lookup consumed by the dispatcher.
///
/// Kept behind a trait so the dispatch path can be exercised without a live
/// template store.
#[async_trait]
pub trait TemplateLookup: Send + Sync {
    async fn template_exists(&self, slug: &str) -> Result<bool, AppError>;
}

#[async_trait]
impl TemplateLookup for PgPool {
    async fn template_exists(&self, slug: &str) -> Result<bool, AppError> {
        match TemplateService::get_by_slug(self, slug).await {
            Ok(_) => Ok(true),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Orchestrates a notification request into exactly one queued send job, or
/// zero jobs on any validation failure.
#[derive(Clone)]
pub struct NotificationDispatcher {
    templates: Arc<dyn TemplateLookup>,
    enqueuer: Enqueuer,
}

impl NotificationDispatcher {
    pub fn new(templates: Arc<dyn TemplateLookup>, enqueuer: Enqueuer) -> Self {
        Self {
            templates,
            enqueuer,
        }
    }

    /// Dispatch a notification to the queue matching its priority.
    ///
    /// Order matters: the template check and type validation both abort
    /// before anything is enqueued, while priority routing never aborts.
    pub async fn dispatch(
        &self,
        request: NotificationRequest,
    ) -> Result<DispatchReceipt, AppError> {
        let request = request.normalized()?;

        if let Some(slug) = &request.template_slug {
            if !self.templates.template_exists(slug).await? {
                return Err(AppError::NotFound(format!("Template <{slug}> not found")));
            }
        }

        let notification_type = PriorityRouter::clean_notification_type(&request.notification_type)?;
        let queue = PriorityRouter::select_queue(&request.priority);

        let payload = NotificationPayload::from(request);
        let outcome = match notification_type {
            NotificationType::Email => {
                self.enqueuer
                    .enqueue(
                        JobKind::SendEmail { payload },
                        EnqueueOptions {
                            queue: Some(queue.to_string()),
                            force: false,
                        },
                    )
                    .await?
            }
        };

        let id = outcome
            .job_id()
            .ok_or_else(|| AppError::Internal("send job unexpectedly skipped".to_string()))?;

        tracing::info!(notification_id = %id, queue, "Notification dispatched");
        Ok(DispatchReceipt {
            notification_id: id.to_string(),
            queue: queue.to_string(),
        })
    }
}
