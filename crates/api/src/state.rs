//! Shared application state for the Axum API server.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_dispatch::dispatcher::NotificationDispatcher;
use courier_dispatch::job::Enqueuer;
use courier_dispatch::lock::DistributedLock;
use courier_dispatch::queue::RedisJobQueue;
use courier_dispatch::store::RedisStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub dispatcher: NotificationDispatcher,
    pub enqueuer: Enqueuer,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the dispatch services over live Postgres and Redis connections.
    pub fn new(pool: PgPool, redis: ConnectionManager, config: AppConfig) -> Self {
        let lock = DistributedLock::new(Arc::new(RedisStore::new(redis.clone())));
        let queue = Arc::new(RedisJobQueue::new(redis));
        let enqueuer = Enqueuer::new(
            lock,
            queue,
            Duration::from_secs(config.bulk_lock_ttl_secs as u64),
        );
        let dispatcher = NotificationDispatcher::new(Arc::new(pool.clone()), enqueuer.clone());

        Self {
            pool,
            dispatcher,
            enqueuer,
            config,
        }
    }
}
