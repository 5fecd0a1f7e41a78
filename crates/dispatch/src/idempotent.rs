//! At-most-one delivery of a recurring notification per cooldown window.
//!
//! Digest sends get retried and re-spawned (a partial batch failure re-runs
//! the whole chunk), so the same (subject, recipient) pair can reach the send
//! path more than once per period. The guard reserves a cooldown-scoped lock
//! before delegating the actual send; losing the reservation means the
//! recipient already got this period's message and the call is dropped.

use std::future::Future;
use std::time::Duration;

use courier_common::error::AppError;
use courier_common::types::NotificationPayload;

use crate::keys::KeyBuilder;
use crate::lock::DistributedLock;

/// Key prefix for digest send reservations.
const DIGEST_KEY_PREFIX: &str = "periodic:digest";

/// Idempotency guard over the distributed lock.
#[derive(Clone)]
pub struct IdempotentSendGuard {
    lock: DistributedLock,
    keys: KeyBuilder,
}

impl IdempotentSendGuard {
    pub fn new(lock: DistributedLock, keys: KeyBuilder) -> Self {
        Self { lock, keys }
    }

    /// Perform `send` at most once per (subject, first recipient) within
    /// `cooldown`. Returns whether the send actually ran.
    pub async fn send_once<F, Fut>(
        &self,
        payload: &NotificationPayload,
        cooldown: Duration,
        send: F,
    ) -> Result<bool, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let key = self.reservation_key(payload)?;
        if !self.lock.acquire(&key, Some(cooldown), false).await? {
            tracing::info!(key, "already sent within cooldown, skipping");
            return Ok(false);
        }
        send().await?;
        Ok(true)
    }

    /// Reservation key: hashed subject bounded by the key builder, prefixed
    /// with the recipient so different recipients never share a window.
    fn reservation_key(&self, payload: &NotificationPayload) -> Result<String, AppError> {
        let recipient = payload
            .recipient_list
            .first()
            .ok_or_else(|| AppError::Validation("recipient list is empty".to_string()))?;
        let prefix = format!("{DIGEST_KEY_PREFIX}:{recipient}:");
        Ok(self
            .keys
            .make_key(&payload.subject, Some(&prefix), None))
    }
}
