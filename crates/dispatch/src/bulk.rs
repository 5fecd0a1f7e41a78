//! Bulk fan-out over date-range chunks.
//!
//! A bulk pass walks the population one chunk at a time: spawn one child job
//! per user in the chunk's range, then enqueue a continuation carrying the
//! next chunk. The continuation runs under the parent's lock (it carries a
//! chunk, so the enqueuer never re-locks it) and the pass ends once the
//! cursor crosses the boundary.

use std::sync::Arc;
use std::time::Duration;

use courier_common::error::AppError;
use courier_common::types::{
    NotificationPayload, QUEUE_EMAILS, UserDetail, UserRole,
};

use crate::chunk::DateChunk;
use crate::directory::UserDirectory;
use crate::idempotent::IdempotentSendGuard;
use crate::job::{EnqueueOptions, Enqueuer, JobKind};
use crate::template::WEEKLY_DIGEST_SLUG;

/// Subject line of the weekly digest.
pub const DIGEST_SUBJECT: &str = "Weekly digest";

/// Fan-out engine for digest and templated bulk sends.
#[derive(Clone)]
pub struct BulkDispatchService {
    directory: Arc<dyn UserDirectory>,
    enqueuer: Enqueuer,
    guard: IdempotentSendGuard,
    /// Chunk width in days of registration dates.
    chunk_days: u32,
    /// Cooldown between digest deliveries to one recipient.
    digest_cooldown: Duration,
}

impl BulkDispatchService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        enqueuer: Enqueuer,
        guard: IdempotentSendGuard,
        chunk_days: u32,
        digest_cooldown: Duration,
    ) -> Self {
        Self {
            directory,
            enqueuer,
            guard,
            chunk_days,
            digest_cooldown,
        }
    }

    /// Process one chunk of the weekly digest pass.
    ///
    /// `chunk` is `None` on the top-level invocation: the boundary is read
    /// fresh from the directory and the initial chunk derived from it.
    /// Returns the continuation chunk that was enqueued, or `None` once the
    /// boundary is exhausted.
    pub async fn run_digest_chunk(
        &self,
        chunk: Option<DateChunk>,
    ) -> Result<Option<DateChunk>, AppError> {
        let chunk = match chunk {
            Some(chunk) => chunk,
            None => {
                let boundary = self
                    .directory
                    .registration_boundary(Some(UserRole::Subscribers))
                    .await?;
                DateChunk::initial(boundary, self.chunk_days)
            }
        };
        if chunk.is_exhausted() {
            return Ok(None);
        }

        let (start, end) = chunk.range();
        let spawned = self
            .spawn_children(start, end, |user| JobKind::SendDigestToSubscriber { user })
            .await?;
        tracing::info!(%start, %end, spawned, "digest fan-out chunk processed");

        self.enqueue_continuation(JobKind::SendDigestToSubscribers {
            chunk: Some(chunk.next()),
        })
        .await
    }

    /// Process one chunk of a templated bulk send.
    pub async fn run_templated_chunk(
        &self,
        chunk: Option<DateChunk>,
        template_slug: &str,
        email_subject: &str,
        user_role: Option<UserRole>,
    ) -> Result<Option<DateChunk>, AppError> {
        let chunk = match chunk {
            Some(chunk) => chunk,
            None => {
                let boundary = self.directory.registration_boundary(user_role).await?;
                DateChunk::initial(boundary, self.chunk_days)
            }
        };
        if chunk.is_exhausted() {
            return Ok(None);
        }

        let (start, end) = chunk.range();
        let spawned = self
            .spawn_children(start, end, |user| JobKind::SendEmail {
                payload: Self::templated_payload(&user, template_slug, email_subject),
            })
            .await?;
        tracing::info!(
            %start, %end, spawned,
            template_slug, "templated fan-out chunk processed"
        );

        self.enqueue_continuation(JobKind::SendTemplatedEmails {
            chunk: Some(chunk.next()),
            template_slug: template_slug.to_string(),
            email_subject: email_subject.to_string(),
            user_role,
        })
        .await
    }

    /// Deliver the digest to one subscriber, at most once per cooldown.
    pub async fn send_digest_to_subscriber<F, Fut>(
        &self,
        user: &UserDetail,
        send: F,
    ) -> Result<bool, AppError>
    where
        F: FnOnce(NotificationPayload) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let payload = Self::digest_payload(user);
        let sent = self
            .guard
            .send_once(&payload, self.digest_cooldown, || send(payload.clone()))
            .await?;
        if sent {
            tracing::debug!(email = %user.email, "digest sent");
        }
        Ok(sent)
    }

    /// Digest message for one subscriber.
    pub fn digest_payload(user: &UserDetail) -> NotificationPayload {
        let mut context = serde_json::Map::new();
        context.insert("name".to_string(), serde_json::json!(user.first_name));
        context.insert("recommendations".to_string(), serde_json::json!([]));
        NotificationPayload {
            subject: DIGEST_SUBJECT.to_string(),
            recipient_list: vec![user.email.clone()],
            content: None,
            template_slug: Some(WEEKLY_DIGEST_SLUG.to_string()),
            context,
        }
    }

    fn templated_payload(
        user: &UserDetail,
        template_slug: &str,
        email_subject: &str,
    ) -> NotificationPayload {
        let mut context = serde_json::Map::new();
        context.insert("name".to_string(), serde_json::json!(user.first_name));
        NotificationPayload {
            subject: email_subject.to_string(),
            recipient_list: vec![user.email.clone()],
            content: None,
            template_slug: Some(template_slug.to_string()),
            context,
        }
    }

    /// Enqueue one child per user in `[start, end)`. A failed child enqueue
    /// is logged and skipped so it never blocks its siblings.
    async fn spawn_children<F>(
        &self,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
        to_job: F,
    ) -> Result<u32, AppError>
    where
        F: Fn(UserDetail) -> JobKind,
    {
        let users = self.directory.users_registered_in(start, end).await?;
        let mut spawned = 0u32;
        for user in users {
            let email = user.email.clone();
            let child = to_job(user);
            let options = EnqueueOptions {
                queue: Some(QUEUE_EMAILS.to_string()),
                force: false,
            };
            match self.enqueuer.enqueue(child, options).await {
                Ok(_) => spawned += 1,
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "failed to spawn child job");
                }
            }
        }
        Ok(spawned)
    }

    async fn enqueue_continuation(&self, kind: JobKind) -> Result<Option<DateChunk>, AppError> {
        let next = kind.chunk().copied();
        match next {
            Some(next) if !next.is_exhausted() => {
                self.enqueuer.enqueue(kind, Default::default()).await?;
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use crate::directory::StubUserDirectory;
    use crate::keys::KeyBuilder;
    use crate::lock::DistributedLock;
    use crate::queue::{JobQueue, MemoryJobQueue};
    use crate::store::MemoryStore;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(chrono::Days::new(n))
            .unwrap()
    }

    fn user(email: &str, date: NaiveDate) -> UserDetail {
        UserDetail {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role: "subscribers".to_string(),
            registration_date: date,
        }
    }

    fn service(
        users: Vec<UserDetail>,
        queue: Arc<MemoryJobQueue>,
    ) -> BulkDispatchService {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(store);
        BulkDispatchService::new(
            Arc::new(StubUserDirectory::new(users)),
            Enqueuer::new(lock.clone(), queue, Duration::from_secs(3 * 60 * 60)),
            IdempotentSendGuard::new(lock, KeyBuilder::new(10)),
            30,
            Duration::from_secs(3600),
        )
    }

    async fn drain(queue: &MemoryJobQueue, name: &str) -> Vec<JobKind> {
        let mut jobs = Vec::new();
        while let Some(envelope) = queue
            .pop(&[name], Duration::from_millis(1))
            .await
            .unwrap()
        {
            jobs.push(envelope.job);
        }
        jobs
    }

    #[tokio::test]
    async fn test_digest_pass_walks_all_chunks() {
        let queue = Arc::new(MemoryJobQueue::new());
        let service = service(
            vec![
                user("a@x.com", day(0)),
                user("b@x.com", day(40)),
                user("c@x.com", day(64)),
            ],
            queue.clone(),
        );

        // top-level invocation reads the boundary (day 0 .. day 64)
        let mut next = service.run_digest_chunk(None).await.unwrap();
        let mut passes = 1;
        while let Some(chunk) = next {
            next = service.run_digest_chunk(Some(chunk)).await.unwrap();
            passes += 1;
            assert!(passes < 10, "chunk sequence must terminate");
        }

        let jobs = drain(&queue, QUEUE_EMAILS).await;
        let children = jobs
            .iter()
            .filter(|j| matches!(j, JobKind::SendDigestToSubscriber { .. }))
            .count();
        // every subscriber strictly inside the boundary gets exactly one child;
        // the boundary maximum itself is exclusive
        assert_eq!(children, 2);
    }

    #[tokio::test]
    async fn test_digest_pass_enqueues_continuation_with_next_chunk() {
        let queue = Arc::new(MemoryJobQueue::new());
        let service = service(
            vec![user("a@x.com", day(0)), user("b@x.com", day(65))],
            queue.clone(),
        );

        let next = service.run_digest_chunk(None).await.unwrap().unwrap();
        assert_eq!(next.start, day(30));

        let jobs = drain(&queue, QUEUE_EMAILS).await;
        let continuation = jobs.iter().find_map(|j| match j {
            JobKind::SendDigestToSubscribers { chunk } => *chunk,
            _ => None,
        });
        assert_eq!(continuation.unwrap().start, day(30));
    }

    #[tokio::test]
    async fn test_exhausted_chunk_spawns_nothing() {
        let queue = Arc::new(MemoryJobQueue::new());
        let service = service(vec![user("a@x.com", day(0))], queue.clone());

        let exhausted = DateChunk {
            start: day(65),
            size_days: 30,
            max: day(65),
        };
        let next = service.run_digest_chunk(Some(exhausted)).await.unwrap();
        assert!(next.is_none());
        assert!(queue.is_empty(QUEUE_EMAILS).await);
    }

    #[tokio::test]
    async fn test_templated_pass_spawns_send_email_children() {
        let queue = Arc::new(MemoryJobQueue::new());
        let service = service(
            vec![user("a@x.com", day(0)), user("b@x.com", day(10))],
            queue.clone(),
        );

        service
            .run_templated_chunk(None, "promo", "Big news", None)
            .await
            .unwrap();

        let jobs = drain(&queue, QUEUE_EMAILS).await;
        let child = jobs
            .iter()
            .find_map(|j| match j {
                JobKind::SendEmail { payload } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(child.subject, "Big news");
        assert_eq!(child.template_slug.as_deref(), Some("promo"));
        assert!(child.content.is_none());
    }

    #[tokio::test]
    async fn test_digest_send_is_idempotent_per_user() {
        let queue = Arc::new(MemoryJobQueue::new());
        let service = service(Vec::new(), queue);
        let subscriber = user("a@x.com", day(0));

        let first = service
            .send_digest_to_subscriber(&subscriber, |_| async { Ok(()) })
            .await
            .unwrap();
        let second = service
            .send_digest_to_subscriber(&subscriber, |_| async { Ok(()) })
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }
}
