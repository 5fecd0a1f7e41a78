use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Name of a delivery queue backing Redis list.
pub type QueueName = String;

/// Queue for urgent notifications.
pub const QUEUE_URGENT: &str = "urgent_notifications";
/// Queue for regular outgoing mail.
pub const QUEUE_EMAILS: &str = "emails";
/// Fallback queue.
pub const QUEUE_DEFAULT: &str = "default";

/// All delivery queues, listed in the order workers drain them.
pub const WORKER_QUEUES: &[&str] = &[QUEUE_URGENT, QUEUE_EMAILS, QUEUE_DEFAULT];

/// Kinds of notification the dispatcher can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
}

impl NotificationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(NotificationType::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Email => write!(f, "email"),
        }
    }
}

/// Delivery priority attached to a notification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Urgent,
    Common,
    Default,
}

impl NotificationPriority {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "urgent" => Some(NotificationPriority::Urgent),
            "common" => Some(NotificationPriority::Common),
            "default" => Some(NotificationPriority::Default),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationPriority::Urgent => write!(f, "urgent"),
            NotificationPriority::Common => write!(f, "common"),
            NotificationPriority::Default => write!(f, "default"),
        }
    }
}

/// An incoming notification request from an external service.
///
/// `priority` and `notification_type` are accepted as raw strings: an
/// unrecognized priority falls back to the default queue, while an
/// unrecognized type is rejected, so neither can be a closed enum here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub subject: String,
    pub notification_type: String,
    pub priority: String,
    pub recipient_list: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub template_slug: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl NotificationRequest {
    /// Enforce the content/template exclusivity rule.
    ///
    /// A request naming a template never carries inline content; a request
    /// naming neither is rejected before it reaches the dispatcher.
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if self.template_slug.is_some() {
            self.content = None;
            return Ok(self);
        }
        if self.content.is_none() {
            return Err(AppError::MissingContent);
        }
        Ok(self)
    }
}

/// The serialized notification placed on a delivery queue.
///
/// Routing metadata (priority, type) is stripped: workers only need what it
/// takes to build and send the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub recipient_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_slug: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl From<NotificationRequest> for NotificationPayload {
    fn from(request: NotificationRequest) -> Self {
        Self {
            subject: request.subject,
            recipient_list: request.recipient_list,
            content: request.content,
            template_slug: request.template_slug,
            context: request.context,
        }
    }
}

/// Receipt returned to the caller after a successful dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub notification_id: String,
    pub queue: QueueName,
}

/// A rendered message ready for a mail client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub content: String,
    pub recipient_list: Vec<String>,
    pub from_email: Option<String>,
}

/// User roles known to the user-directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Viewers,
    Subscribers,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Viewers => write!(f, "viewers"),
            UserRole::Subscribers => write!(f, "subscribers"),
        }
    }
}

/// A user record from the user-directory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub registration_date: NaiveDate,
}

/// Registration dates of the earliest and latest users in the population.
///
/// Interpreted as a half-open range seed: chunks derived from it cover
/// `[first, last)` plus the final partial chunk ending at `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryRange {
    pub first_registration_date: NaiveDate,
    pub last_registration_date: NaiveDate,
}

/// A stored notification template.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An admin-defined periodic task stored in Postgres and picked up by the
/// worker scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PeriodicTask {
    pub id: Uuid,
    /// Name of the registered job this schedule triggers.
    pub task: String,
    /// Human-readable unique name.
    pub name: String,
    pub description: String,
    pub cron: String,
    pub kwargs: serde_json::Value,
    pub one_off: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: Option<&str>, slug: Option<&str>) -> NotificationRequest {
        NotificationRequest {
            subject: "Hi".to_string(),
            notification_type: "email".to_string(),
            priority: "urgent".to_string(),
            recipient_list: vec!["a@x.com".to_string()],
            content: content.map(str::to_string),
            template_slug: slug.map(str::to_string),
            context: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_normalized_keeps_inline_content() {
        let normalized = request(Some("hello"), None).normalized().unwrap();
        assert_eq!(normalized.content.as_deref(), Some("hello"));
        assert!(normalized.template_slug.is_none());
    }

    #[test]
    fn test_normalized_template_wins_over_content() {
        let normalized = request(Some("hello"), Some("welcome")).normalized().unwrap();
        assert!(normalized.content.is_none());
        assert_eq!(normalized.template_slug.as_deref(), Some("welcome"));
    }

    #[test]
    fn test_normalized_rejects_empty_request() {
        let err = request(None, None).normalized().unwrap_err();
        assert_eq!(err.code(), "missing_notification_content");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(
            NotificationPriority::parse("urgent"),
            Some(NotificationPriority::Urgent)
        );
        assert_eq!(NotificationPriority::parse("bogus"), None);
    }

    #[test]
    fn test_payload_strips_routing_metadata() {
        let payload = NotificationPayload::from(request(Some("hello"), None));
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("priority").is_none());
        assert!(value.get("notification_type").is_none());
        assert_eq!(value["subject"], "Hi");
    }
}
