//! Outgoing mail clients.

use async_trait::async_trait;

use courier_common::error::AppError;
use courier_common::types::EmailMessage;

/// Delivery backend for rendered email messages.
#[async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}

/// Mail client that writes messages to the log instead of sending them.
///
/// The default backend for local development and test environments; swap in
/// a real provider client in production deployments.
pub struct ConsoleMailClient;

#[async_trait]
impl MailClient for ConsoleMailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            subject = %message.subject,
            recipients = ?message.recipient_list,
            from = message.from_email.as_deref().unwrap_or("-"),
            content = %message.content,
            "email delivered to console"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every message instead of delivering it.
    #[derive(Default)]
    pub struct CapturingMailClient {
        pub sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl MailClient for CapturingMailClient {
        async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }
}
