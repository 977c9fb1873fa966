//! Deferred job dispatching.
//!
//! Callers hand the dispatcher jobs that should run at a future instant and
//! must be abandoned if they have not run by their deadline. Each job reports
//! its outcome back to the submitter through a [`Completion`] future.

mod base;
mod context;
mod dispatcher;
mod erased;
mod handle;
mod heap;
mod job;
pub mod jobs;
mod queue;

pub use base::{BaseJob, Completion, JobBase};
pub use context::{Clock, JobContext, ManualClock, Reactor, ResourceScope, SystemClock};
pub use dispatcher::{create_dispatcher, DispatchingService, DueTick};
pub use erased::{ErasedJob, JobOutput};
pub use handle::{DispatcherHandle, PendingJobInfo};
pub use heap::PriorityQueue;
pub use job::{Job, JobError, JobId};
pub use queue::{DispatchingQueue, JobOrder};
