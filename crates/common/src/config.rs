use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (locks, cooldowns and job queues)
    pub redis_url: String,

    /// Base URL of the user-directory (auth) service
    pub user_directory_url: String,

    /// Address the API server binds to (default: 0.0.0.0:8000)
    pub api_bind_addr: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Truncated length of hashed cache keys (default: 10)
    pub hashed_key_length: usize,

    /// Sender address stamped on outgoing mail
    pub email_from: String,

    /// Cron schedule for the weekly digest (default: Friday 19:00)
    pub digest_cron: String,

    /// Chunk size for bulk sends, in days of registration dates (default: 30)
    pub bulk_chunk_days: u32,

    /// Lock TTL for bulk parent jobs, in seconds (default: 3 hours)
    pub bulk_lock_ttl_secs: i64,

    /// Cooldown between digest sends to the same recipient, in seconds
    /// (default: 1 hour)
    pub digest_cooldown_secs: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            user_directory_url: std::env::var("USER_DIRECTORY_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            hashed_key_length: std::env::var("HASHED_KEY_LENGTH")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HASHED_KEY_LENGTH must be a valid usize"))?,
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@courier.local".to_string()),
            digest_cron: std::env::var("DIGEST_CRON")
                .unwrap_or_else(|_| "0 19 * * FRI".to_string()),
            bulk_chunk_days: std::env::var("BULK_CHUNK_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BULK_CHUNK_DAYS must be a valid u32"))?,
            bulk_lock_ttl_secs: Self::ttl_var("BULK_LOCK_TTL_SECS", 3 * 60 * 60)?,
            digest_cooldown_secs: Self::ttl_var("DIGEST_COOLDOWN_SECS", 60 * 60)?,
        })
    }

    /// Parse a TTL env var in seconds, floored at zero.
    fn ttl_var(name: &str, default: i64) -> anyhow::Result<i64> {
        let raw = match std::env::var(name) {
            Ok(v) => v
                .parse::<i64>()
                .map_err(|_| anyhow::anyhow!("{} must be a valid i64", name))?,
            Err(_) => default,
        };
        Ok(raw.max(0))
    }
}
