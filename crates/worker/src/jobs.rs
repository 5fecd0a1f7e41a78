//! Queue consumer: pops job envelopes and executes their bodies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{EmailMessage, NotificationPayload, WORKER_QUEUES};
use courier_dispatch::bulk::BulkDispatchService;
use courier_dispatch::job::{Enqueuer, JobKind};
use courier_dispatch::queue::{JobEnvelope, JobQueue};
use courier_dispatch::template::TemplateService;

use crate::mailer::MailClient;

/// How long one BRPOP blocks before the loop re-checks for shutdown.
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Render the outgoing message body for a payload.
///
/// A template payload renders its content against the call context; a plain
/// payload must carry literal content. The dispatcher guarantees one of the
/// two, but queue entries are untrusted input here.
pub fn compose_message(
    payload: &NotificationPayload,
    template_content: Option<&str>,
    from: &str,
) -> Result<EmailMessage, AppError> {
    let content = match template_content {
        Some(template) => TemplateService::render(template, &payload.context)?,
        None => payload.content.clone().ok_or(AppError::MissingContent)?,
    };
    Ok(EmailMessage {
        subject: payload.subject.clone(),
        content,
        recipient_list: payload.recipient_list.clone(),
        from_email: Some(from.to_string()),
    })
}

/// What became of one popped envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Completed,
    /// Past its expiry stamp; dropped without executing the body.
    Expired,
    /// Body failed; a delayed requeue was scheduled.
    Retried,
    /// Body failed with no retry budget left; dropped.
    Dropped,
}

/// Executes job envelopes popped from the delivery queues.
pub struct JobRunner {
    pool: PgPool,
    queue: Arc<dyn JobQueue>,
    enqueuer: Enqueuer,
    bulk: BulkDispatchService,
    mailer: Arc<dyn MailClient>,
    email_from: String,
    bulk_lock_ttl: Duration,
}

impl JobRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        queue: Arc<dyn JobQueue>,
        enqueuer: Enqueuer,
        bulk: BulkDispatchService,
        mailer: Arc<dyn MailClient>,
        email_from: String,
        bulk_lock_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            queue,
            enqueuer,
            bulk,
            mailer,
            email_from,
            bulk_lock_ttl,
        }
    }

    /// Consume the delivery queues until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(queues = ?WORKER_QUEUES, "worker consuming queues");
        loop {
            match self.queue.pop(WORKER_QUEUES, POP_TIMEOUT).await {
                Ok(Some(envelope)) => {
                    self.handle(envelope).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "queue pop failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Execute one envelope, enforcing its time limits and retry policy.
    ///
    /// Overrunning the soft time limit cancels the body and counts as a
    /// retryable failure; the hard limit is the outer kill switch for a body
    /// that somehow outlives the soft one.
    async fn handle(&self, envelope: JobEnvelope) -> HandleOutcome {
        let spec = envelope.job.spec(self.bulk_lock_ttl);

        if envelope.is_expired(Utc::now()) {
            tracing::warn!(job = spec.name, id = %envelope.id, "envelope expired, dropping");
            return HandleOutcome::Expired;
        }

        let body = async {
            match tokio::time::timeout(spec.soft_time_limit, self.execute(&envelope.job)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Internal(format!(
                    "soft time limit of {:?} exceeded",
                    spec.soft_time_limit
                ))),
            }
        };
        let result = match tokio::time::timeout(spec.hard_time_limit, body).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal(format!(
                "hard time limit of {:?} exceeded",
                spec.hard_time_limit
            ))),
        };

        let error = match result {
            Ok(()) => {
                tracing::debug!(job = spec.name, id = %envelope.id, "job completed");
                return HandleOutcome::Completed;
            }
            Err(e) => e.to_string(),
        };

        if envelope.attempt < spec.max_retries {
            tracing::warn!(
                job = spec.name,
                id = %envelope.id,
                attempt = envelope.attempt,
                error,
                "job failed, scheduling retry"
            );
            let enqueuer = self.enqueuer.clone();
            let delay = spec.retry_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = enqueuer.requeue(&envelope).await {
                    tracing::error!(id = %envelope.id, error = %e, "retry requeue failed");
                }
            });
            HandleOutcome::Retried
        } else {
            tracing::error!(
                job = spec.name,
                id = %envelope.id,
                attempt = envelope.attempt,
                error,
                "job failed permanently, dropping"
            );
            HandleOutcome::Dropped
        }
    }

    async fn execute(&self, job: &JobKind) -> Result<(), AppError> {
        match job {
            JobKind::SendEmail { payload } => self.deliver(payload.clone()).await,
            JobKind::SendDigestToSubscriber { user } => {
                self.bulk
                    .send_digest_to_subscriber(user, |payload| self.deliver(payload))
                    .await?;
                Ok(())
            }
            JobKind::SendDigestToSubscribers { chunk } => {
                // the digest template must exist before children render it
                TemplateService::ensure_weekly_digest_template(&self.pool).await?;
                self.bulk.run_digest_chunk(*chunk).await?;
                Ok(())
            }
            JobKind::SendTemplatedEmails {
                chunk,
                template_slug,
                email_subject,
                user_role,
            } => {
                self.bulk
                    .run_templated_chunk(*chunk, template_slug, email_subject, *user_role)
                    .await?;
                Ok(())
            }
        }
    }

    /// Render and send one message.
    async fn deliver(&self, payload: NotificationPayload) -> Result<(), AppError> {
        let template = match &payload.template_slug {
            Some(slug) => Some(TemplateService::get_by_slug(&self.pool, slug).await?),
            None => None,
        };
        let message = compose_message(
            &payload,
            template.as_ref().map(|t| t.content.as_str()),
            &self.email_from,
        )?;
        self.mailer.send(&message).await
    }
}
