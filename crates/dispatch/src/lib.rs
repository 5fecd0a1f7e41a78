//! Task-dispatch and concurrency-safety core of the Courier notification
//! service.
//!
//! Everything with real invariants lives here: the distributed TTL lock and
//! the locked-enqueue job wrapper built on it, priority-to-queue routing, the
//! idempotent-send cooldown guard, and date-range chunking for resumable bulk
//! fan-out. The API and worker crates are thin shells around these services.

pub mod bulk;
pub mod chunk;
pub mod directory;
pub mod dispatcher;
pub mod idempotent;
pub mod job;
pub mod keys;
pub mod lock;
pub mod periodic;
pub mod queue;
pub mod router;
pub mod store;
pub mod template;
