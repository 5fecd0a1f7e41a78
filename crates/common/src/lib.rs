//! Shared foundation for the Courier notification service: configuration,
//! error taxonomy, domain types, and database/Redis connection helpers.

pub mod config;
pub mod db;
pub mod error;
pub mod redis_pool;
pub mod types;
