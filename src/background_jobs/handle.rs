use super::base::{BaseJob, Completion, JobBase};
use super::dispatcher::DispatchingService;
use super::erased::ErasedJob;
use super::job::{Job, JobError, JobId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

/// Serializable view of a pending job.
#[derive(Debug, Clone, Serialize)]
pub struct PendingJobInfo {
    pub id: JobId,
    pub kind: String,
    pub scheduled_at: String,
    pub deadline_at: String,
    pub cancelled: bool,
}

impl From<&ErasedJob> for PendingJobInfo {
    fn from(job: &ErasedJob) -> Self {
        Self {
            id: job.id(),
            kind: short_kind(job.kind()).to_string(),
            scheduled_at: job.scheduled().to_rfc3339(),
            deadline_at: job.deadline().to_rfc3339(),
            cancelled: job.is_cancelled(),
        }
    }
}

/// Last path segment of a type name without generic arguments, e.g.
/// `ReservationNotificationJob`.
fn short_kind(kind: &str) -> &str {
    let path = kind.split('<').next().unwrap_or(kind);
    path.rsplit("::").next().unwrap_or(path)
}

/// Handle for submitting jobs to a running dispatcher.
///
/// Cheap to clone; every clone talks to the same service.
#[derive(Clone)]
pub struct DispatcherHandle {
    service: Arc<DispatchingService>,
}

impl DispatcherHandle {
    pub fn new(service: Arc<DispatchingService>) -> Self {
        Self { service }
    }

    /// Submit an already built job.
    pub fn dispatch<J>(&self, job: J) -> Result<JobId, JobError>
    where
        J: Job + PartialEq + Debug,
    {
        self.dispatch_erased(ErasedJob::new(job))
    }

    /// Submit a job the caller keeps a handle to.
    pub fn dispatch_shared<J>(&self, job: Arc<J>) -> Result<JobId, JobError>
    where
        J: Job + PartialEq + Debug,
    {
        self.dispatch_erased(ErasedJob::from_arc(job))
    }

    pub fn dispatch_erased(&self, job: ErasedJob) -> Result<JobId, JobError> {
        let id = job.id();
        self.service.dispatch(job)?;
        Ok(id)
    }

    /// Build a [`BaseJob`] for the given window, submit it, and return the
    /// future that resolves with its outcome.
    pub fn dispatch_job<J, F>(
        &self,
        scheduled: DateTime<Utc>,
        deadline: DateTime<Utc>,
        build: F,
    ) -> Result<Completion<J::Output>, JobError>
    where
        J: BaseJob + PartialEq + Debug,
        F: FnOnce(JobBase<J::Output>) -> J,
    {
        let (base, completion) = JobBase::new(scheduled, deadline);
        self.dispatch(build(base))?;
        Ok(completion)
    }

    /// Pending jobs in the order they would be started.
    pub fn pending_jobs(&self) -> Vec<PendingJobInfo> {
        self.service
            .pending_jobs()
            .iter()
            .map(PendingJobInfo::from)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.service.pending_count()
    }

    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }
}

impl Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("pending", &self.pending_count())
            .finish()
    }
}
