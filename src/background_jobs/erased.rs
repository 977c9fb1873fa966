//! Type erasure for jobs.
//!
//! Every job has its own `Output` type, but the dispatcher keeps all pending
//! jobs in one queue. `ErasedJob` hides the output type behind an object-safe
//! trait; `JobOutput` carries the typed result through the erased `run` and
//! back into the same job's `success` callback.

use super::context::JobContext;
use super::job::{Job, JobError, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::error;

/// Boxed result of an erased `run`.
pub struct JobOutput(Box<dyn Any + Send>);

impl JobOutput {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Recover the typed value, or give the box back if the type is wrong.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|value| *value).map_err(Self)
    }
}

impl Debug for JobOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobOutput { .. }")
    }
}

/// Object-safe view of a `Job` with its output type erased.
#[async_trait]
trait AnyJob: Send + Sync {
    fn job_id(&self) -> JobId;
    fn scheduled_at(&self) -> DateTime<Utc>;
    fn deadline_at(&self) -> DateTime<Utc>;
    fn cancelled(&self) -> bool;
    fn terminated(&self) -> bool;
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn AnyJob) -> bool;
    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    async fn run_erased(&self, ctx: &JobContext) -> Result<JobOutput, JobError>;
    async fn cancel_erased(&self, ctx: &JobContext);
    async fn success_erased(&self, ctx: &JobContext, output: JobOutput);
    async fn failure_erased(&self, ctx: &JobContext, error: JobError);
    async fn overdue_erased(&self, ctx: &JobContext);
}

#[async_trait]
impl<J> AnyJob for J
where
    J: Job + PartialEq + Debug,
{
    fn job_id(&self) -> JobId {
        Job::id(self)
    }

    fn scheduled_at(&self) -> DateTime<Utc> {
        Job::scheduled(self)
    }

    fn deadline_at(&self) -> DateTime<Utc> {
        Job::deadline(self)
    }

    fn cancelled(&self) -> bool {
        Job::is_cancelled(self)
    }

    fn terminated(&self) -> bool {
        Job::is_terminated(self)
    }

    fn kind(&self) -> &'static str {
        std::any::type_name::<J>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn AnyJob) -> bool {
        other
            .as_any()
            .downcast_ref::<J>()
            .is_some_and(|other| self == other)
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }

    async fn run_erased(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
        Job::run(self, ctx).await.map(JobOutput::new)
    }

    async fn cancel_erased(&self, ctx: &JobContext) {
        Job::cancel(self, ctx).await
    }

    async fn success_erased(&self, ctx: &JobContext, output: JobOutput) {
        match output.downcast::<J::Output>() {
            Ok(output) => Job::success(self, ctx, output).await,
            Err(_) => {
                error!(
                    "Output handed to job {} is not a {}",
                    Job::id(self),
                    std::any::type_name::<J::Output>()
                );
                Job::failure(self, ctx, JobError::OutputMismatch).await
            }
        }
    }

    async fn failure_erased(&self, ctx: &JobContext, error: JobError) {
        Job::failure(self, ctx, error).await
    }

    async fn overdue_erased(&self, ctx: &JobContext) {
        Job::overdue(self, ctx).await
    }
}

/// A job of any output type, as stored in the dispatcher's queues.
///
/// Cloning is cheap and yields a handle to the same job. Equality delegates
/// to the wrapped job's own `PartialEq`; jobs of different concrete types are
/// never equal. Use [`ErasedJob::is_same_job`] for identity.
#[derive(Clone)]
pub struct ErasedJob {
    inner: Arc<dyn AnyJob>,
}

impl ErasedJob {
    pub fn new<J>(job: J) -> Self
    where
        J: Job + PartialEq + Debug,
    {
        Self::from_arc(Arc::new(job))
    }

    /// Erase a job the caller keeps a handle to.
    pub fn from_arc<J>(job: Arc<J>) -> Self
    where
        J: Job + PartialEq + Debug,
    {
        Self { inner: job }
    }

    pub fn id(&self) -> JobId {
        self.inner.job_id()
    }

    pub fn scheduled(&self) -> DateTime<Utc> {
        self.inner.scheduled_at()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.inner.deadline_at()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated()
    }

    /// Type name of the wrapped job.
    pub fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    pub fn is_same_job(&self, other: &ErasedJob) -> bool {
        self.id() == other.id()
    }

    pub async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
        self.inner.run_erased(ctx).await
    }

    pub async fn cancel(&self, ctx: &JobContext) {
        self.inner.cancel_erased(ctx).await
    }

    pub async fn success(&self, ctx: &JobContext, output: JobOutput) {
        self.inner.success_erased(ctx, output).await
    }

    pub async fn failure(&self, ctx: &JobContext, error: JobError) {
        self.inner.failure_erased(ctx, error).await
    }

    pub async fn overdue(&self, ctx: &JobContext) {
        self.inner.overdue_erased(ctx).await
    }
}

impl PartialEq for ErasedJob {
    fn eq(&self, other: &Self) -> bool {
        self.inner.dyn_eq(other.inner.as_ref())
    }
}

impl Debug for ErasedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.describe(f)
    }
}
