//! Background job definitions and the lock-protected enqueue path.
//!
//! A job is data: a [`JobKind`] carrying its arguments, plus a static
//! [`JobSpec`] describing where it runs and how it is locked. The
//! [`Enqueuer`] composes the two with the distributed lock so that a job
//! declaring a lock TTL has at most one queued-or-running instance per
//! (name, suffix) at any time. Failing to acquire the lock silently drops the
//! call — a locked job is an expected outcome, never an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    NotificationPayload, QUEUE_DEFAULT, QUEUE_EMAILS, UserDetail, UserRole,
};

use crate::chunk::DateChunk;
use crate::lock::DistributedLock;
use crate::queue::{JobEnvelope, JobQueue};

/// Job names that administrators may bind to periodic schedules.
pub const PERIODIC_CAPABLE_JOBS: &[&str] = &[SEND_TEMPLATED_EMAILS];

pub const SEND_EMAIL: &str = "send_email";
pub const SEND_DIGEST_TO_SUBSCRIBER: &str = "send_digest_to_subscriber";
pub const SEND_DIGEST_TO_SUBSCRIBERS: &str = "send_digest_to_subscribers";
pub const SEND_TEMPLATED_EMAILS: &str = "send_templated_emails";

/// A background job invocation with its arguments.
///
/// Bulk jobs carry an optional chunk: `None` marks the top-level invocation
/// (the one that takes the lock and derives the initial chunk from the live
/// boundary); `Some` marks a continuation spawned by a previous chunk, which
/// runs under the parent's lock and is never locked individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobKind {
    SendEmail {
        payload: NotificationPayload,
    },
    SendDigestToSubscriber {
        user: UserDetail,
    },
    SendDigestToSubscribers {
        #[serde(default)]
        chunk: Option<DateChunk>,
    },
    SendTemplatedEmails {
        #[serde(default)]
        chunk: Option<DateChunk>,
        template_slug: String,
        email_subject: String,
        #[serde(default)]
        user_role: Option<UserRole>,
    },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::SendEmail { .. } => SEND_EMAIL,
            JobKind::SendDigestToSubscriber { .. } => SEND_DIGEST_TO_SUBSCRIBER,
            JobKind::SendDigestToSubscribers { .. } => SEND_DIGEST_TO_SUBSCRIBERS,
            JobKind::SendTemplatedEmails { .. } => SEND_TEMPLATED_EMAILS,
        }
    }

    /// The chunk marker, if this call is a bulk continuation.
    pub fn chunk(&self) -> Option<&DateChunk> {
        match self {
            JobKind::SendDigestToSubscribers { chunk }
            | JobKind::SendTemplatedEmails { chunk, .. } => chunk.as_ref(),
            _ => None,
        }
    }

    /// Execution profile for this job.
    ///
    /// `bulk_lock_ttl` comes from configuration: it must comfortably exceed a
    /// full bulk pass so a slow run cannot overlap the next scheduled one.
    pub fn spec(&self, bulk_lock_ttl: Duration) -> JobSpec {
        match self {
            JobKind::SendEmail { .. } => JobSpec {
                name: SEND_EMAIL,
                queue: QUEUE_DEFAULT,
                lock_ttl: None,
                suffix: Suffix::Empty,
                soft_time_limit: Duration::from_secs(3),
                hard_time_limit: Duration::from_secs(5),
                expires_in: chrono::Duration::hours(12),
                max_retries: 3,
                retry_delay: Duration::from_secs(5),
            },
            JobKind::SendDigestToSubscriber { .. } => JobSpec {
                name: SEND_DIGEST_TO_SUBSCRIBER,
                queue: QUEUE_EMAILS,
                lock_ttl: None,
                suffix: Suffix::Empty,
                soft_time_limit: Duration::from_secs(3),
                hard_time_limit: Duration::from_secs(5),
                expires_in: chrono::Duration::hours(12),
                max_retries: 3,
                retry_delay: Duration::from_secs(5),
            },
            JobKind::SendDigestToSubscribers { .. } => JobSpec {
                name: SEND_DIGEST_TO_SUBSCRIBERS,
                queue: QUEUE_EMAILS,
                lock_ttl: Some(bulk_lock_ttl),
                suffix: Suffix::Empty,
                soft_time_limit: Duration::from_secs(60 * 60),
                hard_time_limit: Duration::from_secs(2 * 60 * 60),
                expires_in: chrono::Duration::days(1),
                max_retries: 0,
                retry_delay: Duration::from_secs(5),
            },
            JobKind::SendTemplatedEmails { .. } => JobSpec {
                name: SEND_TEMPLATED_EMAILS,
                queue: QUEUE_EMAILS,
                lock_ttl: Some(bulk_lock_ttl),
                // distinct campaigns must not serialize each other
                suffix: Suffix::Derived(|kind| match kind {
                    JobKind::SendTemplatedEmails { template_slug, .. } => {
                        vec![template_slug.clone()]
                    }
                    _ => Vec::new(),
                }),
                soft_time_limit: Duration::from_secs(60 * 60),
                hard_time_limit: Duration::from_secs(2 * 60 * 60),
                expires_in: chrono::Duration::days(1),
                max_retries: 0,
                retry_delay: Duration::from_secs(5),
            },
        }
    }
}

/// Static execution profile of a job: default queue, lock policy, time
/// limits and retry policy.
#[derive(Clone)]
pub struct JobSpec {
    pub name: &'static str,
    pub queue: &'static str,
    /// Locked enqueue only applies when set; `None` bypasses locking.
    pub lock_ttl: Option<Duration>,
    pub suffix: Suffix,
    pub soft_time_limit: Duration,
    pub hard_time_limit: Duration,
    pub expires_in: chrono::Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// How the per-job lock key is disambiguated beyond the job name.
#[derive(Clone)]
pub enum Suffix {
    /// One lock for all invocations of the job.
    Empty,
    /// A static suffix configured on the job.
    Fixed(&'static [&'static str]),
    /// Suffix computed from the call's arguments, resolved once per call.
    Derived(fn(&JobKind) -> Vec<String>),
}

impl Suffix {
    fn resolve(&self, kind: &JobKind) -> Vec<String> {
        match self {
            Suffix::Empty => Vec::new(),
            Suffix::Fixed(parts) => parts.iter().map(|p| p.to_string()).collect(),
            Suffix::Derived(f) => f(kind),
        }
    }
}

/// Deterministic lock key for a job invocation:
/// `task:{name}[:{suffix parts}]:lock`.
pub fn lock_key(spec: &JobSpec, kind: &JobKind) -> String {
    let mut parts = vec!["task".to_string(), spec.name.to_string()];
    parts.extend(spec.suffix.resolve(kind));
    parts.push("lock".to_string());
    parts.join(":")
}

/// Per-call enqueue options.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Override the job's default queue (priority routing).
    pub queue: Option<String>,
    /// Bypass a held lock — operator override for stuck locks.
    pub force: bool,
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Envelope pushed; `id` tracks the delivery.
    Queued { id: Uuid, queue: String },
    /// The job's lock is held elsewhere; the call was dropped, not queued.
    Skipped,
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            EnqueueOutcome::Queued { id, .. } => Some(*id),
            EnqueueOutcome::Skipped => None,
        }
    }
}

/// Lock-protected producer side of the job system.
#[derive(Clone)]
pub struct Enqueuer {
    lock: DistributedLock,
    queue: Arc<dyn JobQueue>,
    bulk_lock_ttl: Duration,
}

impl Enqueuer {
    pub fn new(lock: DistributedLock, queue: Arc<dyn JobQueue>, bulk_lock_ttl: Duration) -> Self {
        Self {
            lock,
            queue,
            bulk_lock_ttl,
        }
    }

    /// Enqueue a job, honoring its lock policy.
    ///
    /// Jobs without a lock TTL, and bulk continuations carrying a chunk, go
    /// straight to the queue. Everything else first takes the job's lock;
    /// losing it returns [`EnqueueOutcome::Skipped`] without queueing.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        options: EnqueueOptions,
    ) -> Result<EnqueueOutcome, AppError> {
        let spec = kind.spec(self.bulk_lock_ttl);
        let queue = options.queue.unwrap_or_else(|| spec.queue.to_string());

        if spec.lock_ttl.is_none() || kind.chunk().is_some() {
            return self.push(&spec, kind, queue).await;
        }

        let key = lock_key(&spec, &kind);
        if self
            .lock
            .acquire(&key, spec.lock_ttl, options.force)
            .await?
        {
            self.push(&spec, kind, queue).await
        } else {
            tracing::debug!(job = spec.name, key, "lock held, dropping enqueue");
            Ok(EnqueueOutcome::Skipped)
        }
    }

    /// Re-queue a popped envelope for another attempt, preserving its id and
    /// expiry. Retries never re-take the lock: the original acquisition still
    /// covers the logical run.
    pub async fn requeue(&self, envelope: &JobEnvelope) -> Result<(), AppError> {
        let mut retry = envelope.clone();
        retry.attempt += 1;
        self.queue.push(&retry).await
    }

    async fn push(
        &self,
        spec: &JobSpec,
        kind: JobKind,
        queue: String,
    ) -> Result<EnqueueOutcome, AppError> {
        let envelope = JobEnvelope {
            id: Uuid::new_v4(),
            job: kind,
            queue: queue.clone(),
            attempt: 0,
            expires_at: Some(Utc::now() + spec.expires_in),
        };
        self.queue.push(&envelope).await?;
        tracing::info!(job = spec.name, queue, id = %envelope.id, "job enqueued");
        Ok(EnqueueOutcome::Queued {
            id: envelope.id,
            queue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DateChunk;
    use crate::queue::MemoryJobQueue;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use courier_common::types::BoundaryRange;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            subject: "Hi".to_string(),
            recipient_list: vec!["a@x.com".to_string()],
            content: Some("hello".to_string()),
            template_slug: None,
            context: serde_json::Map::new(),
        }
    }

    fn bulk(chunk: Option<DateChunk>) -> JobKind {
        JobKind::SendDigestToSubscribers { chunk }
    }

    fn chunk() -> DateChunk {
        DateChunk::initial(
            BoundaryRange {
                first_registration_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                last_registration_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            },
            30,
        )
    }

    fn enqueuer(queue: Arc<MemoryJobQueue>) -> Enqueuer {
        Enqueuer::new(
            DistributedLock::new(Arc::new(MemoryStore::new())),
            queue,
            Duration::from_secs(3 * 60 * 60),
        )
    }

    #[test]
    fn test_lock_key_without_suffix() {
        let kind = bulk(None);
        let spec = kind.spec(Duration::from_secs(1));
        assert_eq!(lock_key(&spec, &kind), "task:send_digest_to_subscribers:lock");
    }

    #[test]
    fn test_lock_key_with_derived_suffix() {
        let kind = JobKind::SendTemplatedEmails {
            chunk: None,
            template_slug: "welcome".to_string(),
            email_subject: "Hi".to_string(),
            user_role: None,
        };
        let spec = kind.spec(Duration::from_secs(1));
        assert_eq!(lock_key(&spec, &kind), "task:send_templated_emails:welcome:lock");

        // identical arguments -> identical key
        assert_eq!(lock_key(&spec, &kind), lock_key(&spec, &kind));
    }

    #[test]
    fn test_lock_key_with_fixed_suffix() {
        let kind = bulk(None);
        let mut spec = kind.spec(Duration::from_secs(1));
        spec.suffix = Suffix::Fixed(&["weekly", "eu"]);
        assert_eq!(
            lock_key(&spec, &kind),
            "task:send_digest_to_subscribers:weekly:eu:lock"
        );
    }

    #[test]
    fn test_derived_suffixes_differ_per_campaign() {
        let a = JobKind::SendTemplatedEmails {
            chunk: None,
            template_slug: "welcome".to_string(),
            email_subject: "Hi".to_string(),
            user_role: None,
        };
        let b = JobKind::SendTemplatedEmails {
            chunk: None,
            template_slug: "goodbye".to_string(),
            email_subject: "Hi".to_string(),
            user_role: None,
        };
        let spec = a.spec(Duration::from_secs(1));
        assert_ne!(lock_key(&spec, &a), lock_key(&spec, &b));
    }

    #[tokio::test]
    async fn test_unlocked_job_always_enqueues() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        for _ in 0..2 {
            let outcome = enqueuer
                .enqueue(JobKind::SendEmail { payload: payload() }, Default::default())
                .await
                .unwrap();
            assert!(outcome.job_id().is_some());
        }
        assert_eq!(queue.len(QUEUE_DEFAULT).await, 2);
    }

    #[tokio::test]
    async fn test_locked_job_second_enqueue_is_skipped() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        let first = enqueuer.enqueue(bulk(None), Default::default()).await.unwrap();
        let second = enqueuer.enqueue(bulk(None), Default::default()).await.unwrap();

        assert!(matches!(first, EnqueueOutcome::Queued { .. }));
        assert_eq!(second, EnqueueOutcome::Skipped);
        assert_eq!(queue.len(QUEUE_EMAILS).await, 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_held_lock() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        enqueuer.enqueue(bulk(None), Default::default()).await.unwrap();
        let forced = enqueuer
            .enqueue(
                bulk(None),
                EnqueueOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(forced, EnqueueOutcome::Queued { .. }));
        assert_eq!(queue.len(QUEUE_EMAILS).await, 2);
    }

    #[tokio::test]
    async fn test_chunk_continuation_bypasses_lock() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        // parent holds the lock
        enqueuer.enqueue(bulk(None), Default::default()).await.unwrap();
        // continuation with a chunk is enqueued regardless
        let continuation = enqueuer
            .enqueue(bulk(Some(chunk())), Default::default())
            .await
            .unwrap();

        assert!(matches!(continuation, EnqueueOutcome::Queued { .. }));
        assert_eq!(queue.len(QUEUE_EMAILS).await, 2);
    }

    #[tokio::test]
    async fn test_queue_override_routes_envelope() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        enqueuer
            .enqueue(
                JobKind::SendEmail { payload: payload() },
                EnqueueOptions {
                    queue: Some("urgent_notifications".to_string()),
                    force: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(queue.len("urgent_notifications").await, 1);
        assert_eq!(queue.len(QUEUE_DEFAULT).await, 0);
    }

    #[tokio::test]
    async fn test_requeue_bumps_attempt() {
        let queue = Arc::new(MemoryJobQueue::new());
        let enqueuer = enqueuer(queue.clone());

        enqueuer
            .enqueue(JobKind::SendEmail { payload: payload() }, Default::default())
            .await
            .unwrap();
        let popped = queue
            .pop(&[QUEUE_DEFAULT], Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        enqueuer.requeue(&popped).await.unwrap();

        let retried = queue
            .pop(&[QUEUE_DEFAULT], Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.id, popped.id);
    }
}
