use super::context::{JobContext, Reactor, ResourceScope};
use super::erased::ErasedJob;
use super::handle::DispatcherHandle;
use super::job::{JobError, JobId};
use super::queue::{DispatchingQueue, JobOrder};
use crate::config::DispatcherSettings;
use crate::metrics::{self, JobOutcome};
use futures::future::join_all;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Running state of the two tick loops.
struct Lifecycle {
    shutdown_token: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

/// Ids of jobs claimed by a tick whose chain has not finished yet.
type InFlightSet = Arc<Mutex<HashSet<JobId>>>;

/// Keeps a claimed job marked as in flight until dropped.
struct InFlight {
    set: InFlightSet,
    id: JobId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// What a single run-due tick did.
#[derive(Debug, Default)]
pub struct DueTick {
    /// Cancelled jobs dropped from the head of the queue without running.
    pub discarded: Vec<JobId>,
    /// Job whose run chain was started.
    pub started: Option<JobId>,
    /// Job that was due but whose deadline had already passed.
    pub expired: Option<JobId>,
    task: Option<JoinHandle<()>>,
}

impl DueTick {
    /// True if the tick neither discarded nor started anything.
    pub fn is_idle(&self) -> bool {
        self.discarded.is_empty() && self.started.is_none() && self.expired.is_none()
    }

    /// Wait for the chain spawned by this tick, if any.
    pub async fn settled(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                error!("Job chain ended abnormally: {}", e);
            }
        }
    }
}

/// In-process dispatcher of deferred jobs.
///
/// Pending jobs live in an arena keyed by id. Two queues index the arena, one
/// by scheduled time and one by deadline. A job is processed only by the tick
/// that removes it from the arena, so it reaches exactly one terminal outcome
/// even when both ticks look at it at the same time.
pub struct DispatchingService {
    settings: DispatcherSettings,
    reactor: Reactor,
    scope: RwLock<Option<Arc<ResourceScope>>>,
    pending: Mutex<HashMap<JobId, ErasedJob>>,
    in_flight: InFlightSet,
    by_scheduled: DispatchingQueue,
    by_deadline: DispatchingQueue,
    lifecycle: Mutex<Option<Lifecycle>>,
}

/// Create a dispatching service and a handle for interacting with it.
pub fn create_dispatcher(
    settings: DispatcherSettings,
    reactor: Reactor,
) -> (Arc<DispatchingService>, DispatcherHandle) {
    let service = Arc::new(DispatchingService::new(settings, reactor));
    let handle = DispatcherHandle::new(service.clone());
    (service, handle)
}

impl DispatchingService {
    pub fn new(settings: DispatcherSettings, reactor: Reactor) -> Self {
        Self {
            settings,
            reactor,
            scope: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            by_scheduled: DispatchingQueue::new(JobOrder::Scheduled),
            by_deadline: DispatchingQueue::new(JobOrder::Deadline),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn handle(self: &Arc<Self>) -> DispatcherHandle {
        DispatcherHandle::new(self.clone())
    }

    /// Attach the resources jobs run with, replacing any previous scope.
    pub fn attach(&self, scope: impl Into<Arc<ResourceScope>>) {
        let scope = scope.into();
        debug!("Attaching resource scope with {} resources", scope.len());
        *self.scope.write().unwrap_or_else(|e| e.into_inner()) = Some(scope);
    }

    pub fn scope(&self) -> Option<Arc<ResourceScope>> {
        self.scope.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<JobId, ErasedJob>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<JobId>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Option<Lifecycle>> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the run-due and expire-overdue loops. A second call while
    /// running is ignored.
    pub fn start(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.is_some() {
            warn!("Dispatcher already started, ignoring start request");
            return;
        }

        let shutdown_token = CancellationToken::new();
        let loops = vec![
            self.reactor
                .spawn(self.clone().run_due_loop(shutdown_token.clone())),
            self.reactor
                .spawn(self.clone().expire_overdue_loop(shutdown_token.clone())),
        ];
        *lifecycle = Some(Lifecycle {
            shutdown_token,
            loops,
        });

        info!(
            "Dispatcher started (run tick every {:?}, expire tick every {:?})",
            self.settings.run_tick_interval, self.settings.expire_tick_interval
        );
    }

    /// Signal both loops to stop and wait for them to exit.
    ///
    /// Pending jobs stay queued; chains already spawned keep running.
    pub async fn stop(&self) {
        let lifecycle = self.lifecycle().take();
        let Some(lifecycle) = lifecycle else {
            debug!("Dispatcher not running, nothing to stop");
            return;
        };

        lifecycle.shutdown_token.cancel();
        for task in lifecycle.loops {
            if let Err(e) = task.await {
                error!("Dispatcher loop ended abnormally: {}", e);
            }
        }

        info!(
            "Dispatcher stopped with {} pending jobs",
            self.pending_count()
        );
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().is_some()
    }

    /// Accept a job for deferred execution.
    ///
    /// A job is accepted once. It is rejected while pending, while a tick is
    /// processing it, and after it has terminated.
    pub fn dispatch(&self, job: ErasedJob) -> Result<(), JobError> {
        if self.scope().is_none() {
            return Err(JobError::NoScope);
        }
        if job.is_terminated() {
            return Err(JobError::AlreadyTerminated(job.id()));
        }

        let pending_count = {
            let mut pending = self.pending();
            if self.in_flight().contains(&job.id()) {
                return Err(JobError::AlreadyDispatched(job.id()));
            }
            match pending.entry(job.id()) {
                Entry::Occupied(_) => return Err(JobError::AlreadyDispatched(job.id())),
                Entry::Vacant(slot) => {
                    slot.insert(job.clone());
                }
            }
            pending.len()
        };

        // A tick may claim the job between these two enqueues. The other
        // queue is then left with a stale entry, which the ticks drop once it
        // reaches the head.
        self.by_deadline.enqueue(job.clone());
        self.by_scheduled.enqueue(job.clone());
        metrics::set_pending_jobs(pending_count);

        info!(
            "Dispatched job {} ({}) scheduled at {} with deadline {}",
            job.id(),
            job.kind(),
            job.scheduled(),
            job.deadline()
        );
        Ok(())
    }

    /// Run a single job through its run/callback chain, outside the managed
    /// queues.
    ///
    /// Calling this on a job that is also queued can make it terminate twice.
    pub async fn execute(&self, job: &ErasedJob, ctx: &JobContext) {
        execute_job(job.clone(), ctx.clone()).await
    }

    /// Fresh context for one execution of `job`.
    pub fn context_for(&self, job: &ErasedJob) -> Result<JobContext, JobError> {
        let scope = self.scope().ok_or(JobError::NoScope)?;
        Ok(self.build_context(job, scope))
    }

    fn build_context(&self, job: &ErasedJob, scope: Arc<ResourceScope>) -> JobContext {
        let span = info_span!("job", id = %job.id(), kind = job.kind());
        JobContext::new(self.reactor.clone(), scope, span)
    }

    /// Take ownership of a pending job. Only one caller can win.
    ///
    /// The job counts as in flight until the returned guard is dropped.
    fn claim(&self, id: JobId) -> Option<(ErasedJob, InFlight)> {
        let (claimed, remaining) = {
            let mut pending = self.pending();
            let claimed = pending.remove(&id).map(|job| {
                self.in_flight().insert(id);
                let guard = InFlight {
                    set: self.in_flight.clone(),
                    id,
                };
                (job, guard)
            });
            (claimed, pending.len())
        };
        if claimed.is_some() {
            metrics::set_pending_jobs(remaining);
        }
        claimed
    }

    fn is_pending(&self, id: JobId) -> bool {
        self.pending().contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Pending jobs in the order they would be started.
    pub fn pending_jobs(&self) -> Vec<ErasedJob> {
        self.by_scheduled
            .snapshot()
            .into_iter()
            .filter(|job| self.is_pending(job.id()))
            .collect()
    }

    pub fn is_queued(&self, id: JobId) -> bool {
        self.by_scheduled.contains(id) || self.by_deadline.contains(id)
    }

    /// Start at most one job whose scheduled time has come.
    ///
    /// Cancelled jobs at the head of the scheduled queue are dropped first.
    /// The run chain is spawned on the reactor and not awaited.
    pub fn run_due_tick(&self) -> DueTick {
        let mut tick = DueTick::default();
        let Some(scope) = self.scope() else {
            return tick;
        };

        while let Some(head) = self
            .by_scheduled
            .dequeue_if(|head| head.is_cancelled() || !self.is_pending(head.id()))
        {
            if self.claim(head.id()).is_none() {
                debug!("Dropped stale queue entry for job {}", head.id());
                continue;
            }
            self.by_deadline.dequeue_job(&head);
            info!("Discarding cancelled job {} ({})", head.id(), head.kind());
            metrics::record_job_outcome(JobOutcome::Discarded);
            tick.discarded.push(head.id());
        }

        let now = self.reactor.now();
        let Some(job) = self.by_scheduled.dequeue_if(|head| head.scheduled() <= now) else {
            return tick;
        };
        let Some((job, in_flight)) = self.claim(job.id()) else {
            debug!("Job {} was already claimed by the expiry tick", job.id());
            return tick;
        };
        self.by_deadline.dequeue_job(&job);

        let ctx = self.build_context(&job, scope);
        let span = ctx.span.clone();
        let id = job.id();
        let overdue = job.deadline() <= now;

        let chain = async move {
            let _in_flight = in_flight;
            if overdue {
                expire_job(job, ctx, false).await;
            } else {
                execute_job(job, ctx).await;
            }
        };
        if overdue {
            tick.expired = Some(id);
        } else {
            tick.started = Some(id);
        }
        tick.task = Some(self.reactor.spawn(chain.instrument(span)));
        tick
    }

    /// Expire every job whose deadline has passed, waiting for all of them.
    ///
    /// Returns the ids of the expired jobs.
    pub async fn expire_overdue_tick(&self) -> Vec<JobId> {
        let Some(scope) = self.scope() else {
            return Vec::new();
        };

        let now = self.reactor.now();
        let mut expired = Vec::new();
        let mut expirations = Vec::new();

        while let Some(head) = self.by_deadline.dequeue_if(|head| head.deadline() <= now) {
            let Some((job, in_flight)) = self.claim(head.id()) else {
                debug!("Dropped stale deadline entry for job {}", head.id());
                continue;
            };
            self.by_scheduled.dequeue_job(&job);

            let ctx = self.build_context(&job, scope.clone());
            let span = ctx.span.clone();
            expired.push(job.id());
            expirations.push(
                async move {
                    let _in_flight = in_flight;
                    expire_job(job, ctx, true).await;
                }
                .instrument(span),
            );
        }

        if !expirations.is_empty() {
            join_all(expirations).await;
            info!("Expired {} overdue jobs", expired.len());
        }
        expired
    }

    async fn run_due_loop(self: Arc<Self>, shutdown_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.run_tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_due_tick();
                }
                _ = shutdown_token.cancelled() => {
                    debug!("Run-due loop received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn expire_overdue_loop(self: Arc<Self>, shutdown_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.expire_tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.expire_overdue_tick().await;
                }
                _ = shutdown_token.cancelled() => {
                    debug!("Expire-overdue loop received shutdown signal");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for DispatchingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchingService")
            .field("settings", &self.settings)
            .field("pending", &self.pending_count())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn execute_job(job: ErasedJob, ctx: JobContext) {
    let start = Instant::now();
    info!("Starting job {} ({})", job.id(), job.kind());
    metrics::record_job_outcome(JobOutcome::Started);

    let result = job.run(&ctx).await;
    let elapsed = start.elapsed();
    metrics::record_job_duration(elapsed);

    match result {
        Ok(output) => {
            info!("Job {} completed successfully in {:?}", job.id(), elapsed);
            metrics::record_job_outcome(JobOutcome::Succeeded);
            job.success(&ctx, output).await;
        }
        Err(e) => {
            error!("Job {} failed after {:?}: {}", job.id(), elapsed, e);
            metrics::record_job_outcome(JobOutcome::Failed);
            job.failure(&ctx, e).await;
        }
    }
}

async fn expire_job(job: ErasedJob, ctx: JobContext, cancel_first: bool) {
    if cancel_first {
        job.cancel(&ctx).await;
    }
    job.overdue(&ctx).await;
    metrics::record_job_outcome(JobOutcome::Overdue);
    warn!(
        "Job {} ({}) missed its deadline {}",
        job.id(),
        job.kind(),
        job.deadline()
    );
}
