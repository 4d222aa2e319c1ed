//! Notification records and delivery.

mod dispatcher;

pub use dispatcher::{BroadcastOutcome, NotificationDispatcher, NotificationMessage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type sent to the guardian when a report is generated.
pub const REPORT_NOTIFICATION: &str = "report";
/// Notification type sent to the caregiver when feedback is submitted.
pub const FEEDBACK_NOTIFICATION: &str = "feedback";

/// A message addressed to one receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub sender_id: Option<String>,
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub content: String,
    /// Opaque payload, e.g. `{"report_id": ...}`.
    pub data: serde_json::Value,
    pub is_read: bool,
    /// Set exactly once, when first read.
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create an unread notification.
    pub fn new(
        sender_id: Option<String>,
        receiver_id: impl Into<String>,
        notification_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id,
            receiver_id: receiver_id.into(),
            notification_type: notification_type.into(),
            title: title.into(),
            content: content.into(),
            data,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }
}
