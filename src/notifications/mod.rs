//! User notifications module

mod models;
mod sink;

pub use models::{Notification, NotificationType, ReservationData};
pub use sink::{LogNotificationSink, MemoryNotificationSink, NotificationSink};
