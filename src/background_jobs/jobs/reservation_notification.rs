//! Reservation notice job.
//!
//! Sent a configurable time after an item on a wishlist is reserved or a
//! reservation is cancelled. If the notice cannot be sent before its ttl
//! elapses it is dropped.

use crate::background_jobs::{BaseJob, Completion, JobBase, JobContext, JobError};
use crate::config::ReservationNoticeSettings;
use crate::notifications::{Notification, NotificationSink, NotificationType, ReservationData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Delivers one reservation notice through the [`NotificationSink`]
/// registered in the job's resource scope.
#[derive(Debug, PartialEq)]
pub struct ReservationNotificationJob {
    base: JobBase<Notification>,
    recipient_id: usize,
    notification_type: NotificationType,
    data: ReservationData,
}

impl ReservationNotificationJob {
    /// Create a notice for an event that happened at `event_at`, timed by `settings`.
    ///
    /// Fails if the notice window falls outside the representable time range.
    pub fn new(
        settings: &ReservationNoticeSettings,
        event_at: DateTime<Utc>,
        recipient_id: usize,
        notification_type: NotificationType,
        data: ReservationData,
    ) -> anyhow::Result<(Self, Completion<Notification>)> {
        let (scheduled, deadline) = settings.window(event_at)?;
        let (base, completion) = JobBase::new(scheduled, deadline);
        let job = Self::with_base(base, recipient_id, notification_type, data);
        Ok((job, completion))
    }

    pub fn with_base(
        base: JobBase<Notification>,
        recipient_id: usize,
        notification_type: NotificationType,
        data: ReservationData,
    ) -> Self {
        Self {
            base,
            recipient_id,
            notification_type,
            data,
        }
    }

    pub fn recipient_id(&self) -> usize {
        self.recipient_id
    }

    pub fn notification_type(&self) -> NotificationType {
        self.notification_type
    }
}

#[async_trait]
impl BaseJob for ReservationNotificationJob {
    type Output = Notification;

    fn base(&self) -> &JobBase<Notification> {
        &self.base
    }

    async fn perform(&self, ctx: &JobContext) -> Result<Notification, JobError> {
        let sink = ctx
            .resource::<Arc<dyn NotificationSink>>()
            .ok_or_else(|| JobError::ExecutionFailed("No notification sink registered".into()))?;

        let notification = Notification::reservation(
            self.recipient_id,
            self.notification_type,
            &self.data,
            ctx.now(),
        );

        sink.deliver(&notification)
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("Delivery failed: {}", e)))?;

        info!(
            "Sent {:?} notice for item {} to user {}",
            self.notification_type, self.data.item_id, self.recipient_id
        );
        Ok(notification)
    }
}
