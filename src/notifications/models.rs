//! Notification data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ItemReserved,
    ReservationCancelled,
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: usize,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: Option<String>,
    pub data: serde_json::Value,
    pub created_at: i64,
}

/// Data payload for reservation notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationData {
    pub list_id: usize,
    pub list_name: String,
    pub item_id: usize,
    pub item_name: String,
}

impl Notification {
    /// Build a notice about a reservation event on a wishlist item.
    pub fn reservation(
        recipient_id: usize,
        notification_type: NotificationType,
        data: &ReservationData,
        created_at: DateTime<Utc>,
    ) -> Self {
        let (title, body) = match notification_type {
            NotificationType::ItemReserved => (
                format!("Reserved: {}", data.item_name),
                format!("You reserved \"{}\" from {}", data.item_name, data.list_name),
            ),
            NotificationType::ReservationCancelled => (
                format!("Reservation cancelled: {}", data.item_name),
                format!(
                    "Your reservation of \"{}\" from {} was cancelled",
                    data.item_name, data.list_name
                ),
            ),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id,
            notification_type,
            title,
            body: Some(body),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
            created_at: created_at.timestamp(),
        }
    }
}
