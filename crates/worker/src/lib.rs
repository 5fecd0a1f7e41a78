//! Queue consumer and scheduler for the Courier notification service.

pub mod jobs;
pub mod mailer;
pub mod scheduler;
