use super::context::JobContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Stable identity of a dispatched job.
///
/// Used as the arena key inside the dispatcher and for removal-by-value from
/// the time-ordered queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur while dispatching or executing a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job deadline elapsed before it could run")]
    Overdue,

    #[error("Job has no work to perform")]
    NoWork,

    #[error("Dispatcher has no resource scope attached")]
    NoScope,

    #[error("Job {0} is already dispatched")]
    AlreadyDispatched(JobId),

    #[error("Job {0} has already terminated")]
    AlreadyTerminated(JobId),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job output did not match the job's declared output type")]
    OutputMismatch,

    #[error("Job was dropped before reporting an outcome")]
    Abandoned,
}

/// A unit of deferred work.
///
/// The dispatcher invokes `run` once the scheduled time is reached and then
/// exactly one of `success` or `failure`. If the deadline elapses first it
/// invokes `overdue` instead (preceded by `cancel` when the expiry tick is
/// the one that notices).
///
/// `run` may be called on a job whose `is_cancelled` is already true:
/// implementations must check for themselves.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Value produced by a successful run.
    type Output: Send + 'static;

    fn id(&self) -> JobId;

    /// Earliest instant the job is eligible to run.
    fn scheduled(&self) -> DateTime<Utc>;

    /// Instant after which the job is abandoned if it has not run.
    fn deadline(&self) -> DateTime<Utc>;

    fn is_cancelled(&self) -> bool;

    /// True once the job has reached a terminal outcome. A terminated job is
    /// never dispatched again.
    fn is_terminated(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &JobContext) -> Result<Self::Output, JobError>;

    async fn cancel(&self, ctx: &JobContext);

    async fn success(&self, ctx: &JobContext, output: Self::Output);

    async fn failure(&self, ctx: &JobContext, error: JobError);

    async fn overdue(&self, ctx: &JobContext);
}
