//! Cron scheduler for the built-in digest and admin-defined periodic tasks.
//!
//! One tick per minute: a schedule fires when its next occurrence after the
//! previous tick has passed. The locked enqueue makes double-firing harmless
//! — if a previous run still holds the job's lock, the new one is dropped.

use chrono::{DateTime, Utc};
use croner::Cron;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{PeriodicTask, UserRole};
use courier_dispatch::job::{EnqueueOutcome, Enqueuer, JobKind, SEND_TEMPLATED_EMAILS};
use courier_dispatch::periodic::PeriodicTaskService;

const TICK: std::time::Duration = std::time::Duration::from_secs(60);

/// Whether a cron schedule has an occurrence in `(after, now]`.
pub fn is_due(cron: &Cron, after: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match cron.find_next_occurrence(&after, false) {
        Ok(next) => next <= now,
        Err(_) => false,
    }
}

/// Build the bulk-send job an admin-defined schedule triggers.
///
/// `template_slug` and `email_subject` are validated at creation time, but
/// rows are re-checked here: a schedule predating a validation rule must not
/// take the worker down.
pub fn templated_job(task: &PeriodicTask) -> Result<JobKind, AppError> {
    if task.task != SEND_TEMPLATED_EMAILS {
        return Err(AppError::UnknownTask(task.task.clone()));
    }
    let kwarg = |key: &str| -> Result<String, AppError> {
        task.kwargs
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation(format!("kwargs is missing required key <{key}>")))
    };
    let user_role = match task.kwargs.get("user_role") {
        Some(value) => Some(
            serde_json::from_value::<UserRole>(value.clone())
                .map_err(|_| AppError::Validation(format!("invalid user_role: {value}")))?,
        ),
        None => None,
    };
    Ok(JobKind::SendTemplatedEmails {
        chunk: None,
        template_slug: kwarg("template_slug")?,
        email_subject: kwarg("email_subject")?,
        user_role,
    })
}

/// Minute-resolution scheduler over the periodic task table.
pub struct Scheduler {
    pool: PgPool,
    enqueuer: Enqueuer,
    digest_cron: Cron,
}

impl Scheduler {
    pub fn new(pool: PgPool, enqueuer: Enqueuer, digest_cron: Cron) -> Self {
        Self {
            pool,
            enqueuer,
            digest_cron,
        }
    }

    /// Tick forever. Runs until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_tick = Utc::now();

        tracing::info!("scheduler started");
        loop {
            interval.tick().await;
            let now = Utc::now();
            if let Err(e) = self.tick(last_tick, now).await {
                tracing::error!(error = %e, "scheduler tick failed");
            }
            last_tick = now;
        }
    }

    async fn tick(&self, after: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
        if is_due(&self.digest_cron, after, now) {
            Self::fire(
                &self.enqueuer,
                "weekly-digest",
                JobKind::SendDigestToSubscribers { chunk: None },
            )
            .await;
        }

        for task in PeriodicTaskService::list_enabled(&self.pool).await? {
            let cron = match Cron::new(&task.cron).parse() {
                Ok(cron) => cron,
                Err(e) => {
                    tracing::warn!(name = %task.name, error = %e, "stored cron does not parse, skipping");
                    continue;
                }
            };
            if !is_due(&cron, after, now) {
                continue;
            }
            let job = match templated_job(&task) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(name = %task.name, error = %e, "stored task is invalid, skipping");
                    continue;
                }
            };
            let outcome = Self::fire(&self.enqueuer, &task.name, job).await;
            // A one-off stays enabled until a run is actually queued: an
            // enqueue declined by the lock (or failed outright) must get
            // another chance on a later tick.
            if task.one_off && matches!(outcome, Some(EnqueueOutcome::Queued { .. })) {
                PeriodicTaskService::disable(&self.pool, task.id).await?;
                tracing::info!(name = %task.name, "one-off task disabled after successful enqueue");
            }
        }
        Ok(())
    }

    async fn fire(enqueuer: &Enqueuer, name: &str, job: JobKind) -> Option<EnqueueOutcome> {
        match enqueuer.enqueue(job, Default::default()).await {
            Ok(outcome) => {
                match &outcome {
                    EnqueueOutcome::Queued { id, queue } => {
                        tracing::info!(name, %id, queue, "scheduled job enqueued");
                    }
                    EnqueueOutcome::Skipped => {
                        tracing::info!(name, "task is locked, previous run still in progress");
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(name, error = %e, "scheduled enqueue failed");
                None
            }
        }
    }
}
