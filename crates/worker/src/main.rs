//! Courier worker binary: queue consumer plus cron scheduler.

use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_dispatch::bulk::BulkDispatchService;
use courier_dispatch::directory::HttpUserDirectory;
use courier_dispatch::idempotent::IdempotentSendGuard;
use courier_dispatch::job::Enqueuer;
use courier_dispatch::keys::KeyBuilder;
use courier_dispatch::lock::DistributedLock;
use courier_dispatch::periodic::PeriodicTaskService;
use courier_dispatch::queue::RedisJobQueue;
use courier_dispatch::store::RedisStore;
use courier_dispatch::template::TemplateService;

use courier_worker::jobs::JobRunner;
use courier_worker::mailer::ConsoleMailClient;
use courier_worker::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_dispatch=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let digest_cron = PeriodicTaskService::validate_cron(&config.digest_cron)
        .map_err(|e| anyhow::anyhow!("DIGEST_CRON: {e}"))?;

    // Connect to database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations and seed the built-in digest template
    sqlx::migrate!("../../migrations").run(&pool).await?;
    TemplateService::ensure_weekly_digest_template(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;

    // Wire dispatch services
    let bulk_lock_ttl = Duration::from_secs(config.bulk_lock_ttl_secs as u64);
    let lock = DistributedLock::new(Arc::new(RedisStore::new(redis.clone())));
    let queue = Arc::new(RedisJobQueue::new(redis));
    let enqueuer = Enqueuer::new(lock.clone(), queue.clone(), bulk_lock_ttl);
    let guard = IdempotentSendGuard::new(lock, KeyBuilder::new(config.hashed_key_length));
    let bulk = BulkDispatchService::new(
        Arc::new(HttpUserDirectory::new(config.user_directory_url.clone())),
        enqueuer.clone(),
        guard,
        config.bulk_chunk_days,
        Duration::from_secs(config.digest_cooldown_secs as u64),
    );

    let runner = JobRunner::new(
        pool.clone(),
        queue,
        enqueuer.clone(),
        bulk,
        Arc::new(ConsoleMailClient),
        config.email_from.clone(),
        bulk_lock_ttl,
    );
    let scheduler = Scheduler::new(pool, enqueuer, digest_cron);

    // Run both loops with graceful shutdown on Ctrl+C
    tokio::select! {
        result = runner.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "consumer exited with error");
                return Err(e);
            }
        }
        result = scheduler.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "scheduler exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
