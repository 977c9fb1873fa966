use super::jobs::RecordingJob;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use wishlist_server::background_jobs::{
    create_dispatcher, Clock, Completion, DispatcherHandle, DispatchingService, JobBase, JobId,
    ManualClock, Reactor, ResourceScope,
};
use wishlist_server::config::DispatcherSettings;
use wishlist_server::notifications::{MemoryNotificationSink, NotificationSink};

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 1, 9, 30, 0).unwrap()
}

/// Dispatcher on a manual clock with an in-memory notification sink attached.
///
/// Must be created inside a tokio runtime.
pub struct TestDispatcher {
    pub clock: Arc<ManualClock>,
    pub service: Arc<DispatchingService>,
    pub handle: DispatcherHandle,
    pub sink: Arc<MemoryNotificationSink>,
}

impl TestDispatcher {
    pub fn new() -> Self {
        Self::with_settings(DispatcherSettings::default())
    }

    pub fn with_settings(settings: DispatcherSettings) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let reactor = Reactor::current_with_clock(clock.clone()).unwrap();
        let (service, handle) = create_dispatcher(settings, reactor);

        let sink = Arc::new(MemoryNotificationSink::new());
        let shared: Arc<dyn NotificationSink> = sink.clone();
        service.attach(ResourceScope::new().with(shared));

        Self {
            clock,
            service,
            handle,
            sink,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    /// A succeeding job scheduled and expiring relative to the clock's now.
    pub fn job(
        &self,
        label: &str,
        scheduled_in: i64,
        deadline_in: i64,
    ) -> (Arc<RecordingJob>, Completion<String>) {
        let now = self.now();
        let (base, completion) = JobBase::new(
            now + Duration::seconds(scheduled_in),
            now + Duration::seconds(deadline_in),
        );
        (Arc::new(RecordingJob::new(base, label)), completion)
    }

    /// A job whose run fails with `message`.
    pub fn failing_job(
        &self,
        message: &str,
        scheduled_in: i64,
        deadline_in: i64,
    ) -> (Arc<RecordingJob>, Completion<String>) {
        let now = self.now();
        let (base, completion) = JobBase::new(
            now + Duration::seconds(scheduled_in),
            now + Duration::seconds(deadline_in),
        );
        (Arc::new(RecordingJob::failing(base, message)), completion)
    }

    pub fn dispatch(&self, job: &Arc<RecordingJob>) -> JobId {
        self.handle.dispatch_shared(job.clone()).unwrap()
    }

    pub fn is_queued(&self, id: JobId) -> bool {
        self.service.is_queued(id)
    }
}
