//! Distributed TTL-scoped mutual exclusion over the shared key-value store.
//!
//! A lock is nothing but the presence of a key: acquisition is a single
//! atomic set-if-absent, release is expiry. Locks are never explicitly
//! unlocked on abnormal termination — a crashed holder must not leave a job
//! locked forever, so every lock a job takes is TTL-bounded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use courier_common::error::AppError;

use crate::store::KeyValueStore;

/// TTL-based exclusive lock.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock named `key`.
    ///
    /// Without `force` this is set-if-absent: `true` iff the key was
    /// previously absent. With `force` the key is overwritten and the TTL
    /// reset unconditionally — the operator escape hatch for a stuck lock.
    ///
    /// Failure to acquire is normal control flow, not an error; store
    /// unavailability propagates and is not retried here.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Option<Duration>,
        force: bool,
    ) -> Result<bool, AppError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        if force {
            tracing::debug!(key, "force=true, overwriting lock");
            self.store.set(key, &timestamp, ttl).await?;
            return Ok(true);
        }
        if !self.store.set_if_absent(key, &timestamp, ttl).await? {
            tracing::debug!(key, "lock is held by another owner");
            return Ok(false);
        }
        tracing::debug!(key, "lock acquired");
        Ok(true)
    }

    /// Drop a lock early. Only used by operator tooling; the normal release
    /// path is TTL expiry.
    pub async fn release(&self, key: &str) -> Result<(), AppError> {
        self.store.delete(key).await
    }
}
