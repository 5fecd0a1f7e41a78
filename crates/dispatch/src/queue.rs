//! Named delivery queues over Redis lists.
//!
//! Producers LPUSH serialized job envelopes; workers BRPOP across all queues
//! with the key order expressing priority. Delivery is at-least-once at this
//! level — application-level deduplication is the idempotent guard's job.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_common::error::AppError;

use crate::job::JobKind;

/// A job on the wire: immutable once enqueued, consumed exactly once per
/// delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub job: JobKind,
    pub queue: String,
    /// Zero-based delivery attempt, bumped on each retry.
    pub attempt: u32,
    /// Envelopes older than this are dropped unexecuted.
    pub expires_at: Option<DateTime<Utc>>,
}

impl JobEnvelope {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Enqueue/dequeue surface for named job queues.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an envelope to its queue.
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), AppError>;

    /// Pop the next envelope from the first non-empty queue in `queues`,
    /// waiting up to `timeout`. `None` on timeout.
    async fn pop(
        &self,
        queues: &[&str],
        timeout: Duration,
    ) -> Result<Option<JobEnvelope>, AppError>;
}

/// Redis list-backed queue. One list per queue name, keyed `queue:{name}`.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn queue_key(name: &str) -> String {
        format!("queue:{name}")
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), AppError> {
        let body = serde_json::to_string(envelope)
            .map_err(|e| AppError::Internal(format!("failed to serialize job envelope: {e}")))?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(Self::queue_key(&envelope.queue))
            .arg(body)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[&str],
        timeout: Duration,
    ) -> Result<Option<JobEnvelope>, AppError> {
        let mut cmd = redis::cmd("BRPOP");
        for queue in queues {
            cmd.arg(Self::queue_key(queue));
        }
        cmd.arg(timeout.as_secs_f64());

        let mut conn = self.conn.clone();
        let reply: Option<(String, String)> = cmd.query_async(&mut conn).await?;
        match reply {
            Some((_key, body)) => {
                let envelope = serde_json::from_str(&body).map_err(|e| {
                    AppError::Internal(format!("failed to deserialize job envelope: {e}"))
                })?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }
}

/// In-process queue for unit tests: same contract, no Redis.
#[derive(Default)]
pub struct MemoryJobQueue {
    queues: Mutex<HashMap<String, VecDeque<JobEnvelope>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes currently waiting on `queue`.
    pub async fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<(), AppError> {
        self.queues
            .lock()
            .await
            .entry(envelope.queue.clone())
            .or_default()
            .push_back(envelope.clone());
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[&str],
        _timeout: Duration,
    ) -> Result<Option<JobEnvelope>, AppError> {
        let mut locked = self.queues.lock().await;
        for queue in queues {
            if let Some(envelope) = locked.get_mut(*queue).and_then(VecDeque::pop_front) {
                return Ok(Some(envelope));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::{NotificationPayload, QUEUE_EMAILS, QUEUE_URGENT};

    fn envelope(queue: &str, subject: &str) -> JobEnvelope {
        JobEnvelope {
            id: Uuid::new_v4(),
            job: JobKind::SendEmail {
                payload: NotificationPayload {
                    subject: subject.to_string(),
                    recipient_list: vec!["a@x.com".to_string()],
                    content: Some("hello".to_string()),
                    template_slug: None,
                    context: serde_json::Map::new(),
                },
            },
            queue: queue.to_string(),
            attempt: 0,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_pop_respects_queue_priority_order() {
        let queue = MemoryJobQueue::new();
        queue.push(&envelope(QUEUE_EMAILS, "regular")).await.unwrap();
        queue.push(&envelope(QUEUE_URGENT, "urgent")).await.unwrap();

        let popped = queue
            .pop(&[QUEUE_URGENT, QUEUE_EMAILS], Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.queue, QUEUE_URGENT);
    }

    #[tokio::test]
    async fn test_pop_on_empty_returns_none() {
        let queue = MemoryJobQueue::new();
        let popped = queue
            .pop(&[QUEUE_DEFAULT_TEST], Duration::from_millis(10))
            .await
            .unwrap();
        assert!(popped.is_none());
    }

    const QUEUE_DEFAULT_TEST: &str = "default";

    #[test]
    fn test_envelope_expiry() {
        let mut env = envelope(QUEUE_EMAILS, "x");
        assert!(!env.is_expired(Utc::now()));
        env.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(env.is_expired(Utc::now()));
    }

    #[test]
    fn test_envelope_wire_format_carries_job_tag() {
        let env = envelope(QUEUE_EMAILS, "x");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["job"], "send_email");
        let back: JobEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back.queue, QUEUE_EMAILS);
    }
}
