//! Priority-to-queue routing and notification-type validation.

use courier_common::error::AppError;
use courier_common::types::{
    NotificationPriority, NotificationType, QUEUE_DEFAULT, QUEUE_EMAILS, QUEUE_URGENT,
};

/// Maps request priorities onto delivery queues and validates notification
/// types against what the dispatcher supports.
pub struct PriorityRouter;

impl PriorityRouter {
    /// Queue for a raw priority string.
    ///
    /// Unrecognized priorities are not an error: the request silently falls
    /// back to the default queue. An exhaustive match keeps a mapping gap a
    /// compile error rather than a runtime configuration defect.
    pub fn select_queue(priority: &str) -> &'static str {
        let priority =
            NotificationPriority::parse(priority).unwrap_or(NotificationPriority::Default);
        match priority {
            NotificationPriority::Urgent => QUEUE_URGENT,
            NotificationPriority::Common => QUEUE_EMAILS,
            NotificationPriority::Default => QUEUE_DEFAULT,
        }
    }

    /// Validate the notification type.
    ///
    /// Unlike priorities, an unknown type is a client error and aborts the
    /// dispatch.
    pub fn clean_notification_type(value: &str) -> Result<NotificationType, AppError> {
        NotificationType::parse(value)
            .ok_or_else(|| AppError::InvalidNotificationType(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_queue_map() {
        assert_eq!(PriorityRouter::select_queue("urgent"), "urgent_notifications");
        assert_eq!(PriorityRouter::select_queue("common"), "emails");
        assert_eq!(PriorityRouter::select_queue("default"), "default");
    }

    #[test]
    fn test_unknown_priority_falls_back_to_default() {
        assert_eq!(
            PriorityRouter::select_queue("bogus"),
            PriorityRouter::select_queue("default")
        );
    }

    #[test]
    fn test_email_type_is_supported() {
        assert_eq!(
            PriorityRouter::clean_notification_type("email").unwrap(),
            NotificationType::Email
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = PriorityRouter::clean_notification_type("sms").unwrap_err();
        assert_eq!(err.code(), "invalid_notification_type");
        assert!(err.to_string().contains("sms"));
    }
}
