use super::context::JobContext;
use super::job::{Job, JobError, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error};

type Outcome<T> = Result<T, JobError>;

/// Shared state for jobs built on the default contract implementation.
///
/// Holds the timing, the cancelled flag, and the sending half of the
/// completion signal. The receiving half is the [`Completion`] handed back by
/// [`JobBase::new`].
pub struct JobBase<T> {
    id: JobId,
    scheduled: DateTime<Utc>,
    deadline: DateTime<Utc>,
    cancelled: AtomicBool,
    completion: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

impl<T: Send + 'static> JobBase<T> {
    pub fn new(scheduled: DateTime<Utc>, deadline: DateTime<Utc>) -> (Self, Completion<T>) {
        let id = JobId::new();
        let (tx, rx) = oneshot::channel();
        let base = Self {
            id,
            scheduled,
            deadline,
            cancelled: AtomicBool::new(false),
            completion: Mutex::new(Some(tx)),
        };
        (base, Completion { job_id: id, rx })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn scheduled(&self) -> DateTime<Utc> {
        self.scheduled
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Set the cancelled flag. Returns true if this call flipped it.
    pub fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Whether the completion signal has already been fulfilled.
    pub fn is_resolved(&self) -> bool {
        self.completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Fulfil the completion signal. Returns false if it was already fulfilled.
    pub fn resolve(&self, outcome: Outcome<T>) -> bool {
        let sender = self
            .completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("Nobody is waiting on the outcome of job {}", self.id);
                }
                true
            }
            None => {
                error!("Job {} resolved more than once, ignoring", self.id);
                false
            }
        }
    }
}

impl<T> std::fmt::Debug for JobBase<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBase")
            .field("id", &self.id)
            .field("scheduled", &self.scheduled)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> PartialEq for JobBase<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// The submitter's side of a job's completion signal.
///
/// Resolves once the dispatcher reports the job's terminal outcome. If the
/// job is dropped without an outcome, resolves to `JobError::Abandoned`.
#[derive(Debug)]
pub struct Completion<T> {
    job_id: JobId,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Completion<T> {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Non-blocking check. `None` while the job has no outcome yet.
    pub fn try_outcome(&mut self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(JobError::Abandoned)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(JobError::Abandoned)))
    }
}

/// A job that keeps its state in a [`JobBase`] and only supplies its body.
///
/// Every `BaseJob` is a [`Job`]:
/// - `run` fails with `Cancelled` if the job was cancelled, else calls `perform`
/// - `success`/`failure` fulfil the completion signal
/// - `overdue` marks the job cancelled and fails the completion with `Overdue`
/// - `cancel` only logs; cancellation is a consequence of `overdue`
#[async_trait]
pub trait BaseJob: Send + Sync + 'static {
    type Output: Send + 'static;

    fn base(&self) -> &JobBase<Self::Output>;

    /// The actual work. Without an override the job has nothing to do.
    async fn perform(&self, _ctx: &JobContext) -> Result<Self::Output, JobError> {
        Err(JobError::NoWork)
    }
}

#[async_trait]
impl<B: BaseJob> Job for B {
    type Output = B::Output;

    fn id(&self) -> JobId {
        self.base().id()
    }

    fn scheduled(&self) -> DateTime<Utc> {
        self.base().scheduled()
    }

    fn deadline(&self) -> DateTime<Utc> {
        self.base().deadline()
    }

    fn is_cancelled(&self) -> bool {
        self.base().is_cancelled()
    }

    fn is_terminated(&self) -> bool {
        self.base().is_resolved() || self.base().is_cancelled()
    }

    async fn run(&self, ctx: &JobContext) -> Result<Self::Output, JobError> {
        if self.base().is_cancelled() {
            return Err(JobError::Cancelled);
        }
        self.perform(ctx).await
    }

    async fn cancel(&self, ctx: &JobContext) {
        debug!(parent: &ctx.span, "Cancel requested for job {}", self.base().id());
    }

    async fn success(&self, _ctx: &JobContext, output: Self::Output) {
        self.base().resolve(Ok(output));
    }

    async fn failure(&self, _ctx: &JobContext, error: JobError) {
        self.base().resolve(Err(error));
    }

    async fn overdue(&self, _ctx: &JobContext) {
        self.base().mark_cancelled();
        self.base().resolve(Err(JobError::Overdue));
    }
}
