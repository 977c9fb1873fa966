use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tracing::Span;

/// Source of "now" for the dispatcher and its jobs.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to drive ticks deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to the event loop driving the dispatcher.
///
/// Bundles the tokio runtime handle used to spawn job chains with the clock
/// that decides what "now" means.
#[derive(Clone)]
pub struct Reactor {
    handle: Handle,
    clock: Arc<dyn Clock>,
}

impl Reactor {
    pub fn new(handle: Handle, clock: Arc<dyn Clock>) -> Self {
        Self { handle, clock }
    }

    /// Reactor bound to the runtime the caller is running on, using wall-clock time.
    pub fn current() -> Result<Self, TryCurrentError> {
        Ok(Self::new(Handle::try_current()?, Arc::new(SystemClock)))
    }

    /// Reactor bound to the current runtime with a custom clock.
    pub fn current_with_clock(clock: Arc<dyn Clock>) -> Result<Self, TryCurrentError> {
        Ok(Self::new(Handle::try_current()?, clock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// Process-wide resources made available to job bodies.
///
/// A small type map: one value per type. Trait objects are stored behind an
/// `Arc`, e.g. `scope.insert::<Arc<dyn NotificationSink>>(sink)`.
#[derive(Default)]
pub struct ResourceScope {
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resource, returning the one it replaced, if any.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Any + Send + Sync,
    {
        self.resources
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.insert(value);
        self
    }

    pub fn get<T>(&self) -> Option<T>
    where
        T: Any + Clone,
    {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("resources", &self.resources.len())
            .finish()
    }
}

/// Context provided to a job for a single execution.
///
/// Built fresh by the dispatcher for every run/callback chain and dropped
/// once that chain completes.
#[derive(Clone)]
pub struct JobContext {
    /// Event loop and clock.
    pub reactor: Reactor,

    /// Shared resources (notification sinks, stores, ...).
    pub scope: Arc<ResourceScope>,

    /// Span all log output of this execution is recorded under.
    pub span: Span,
}

impl JobContext {
    pub fn new(reactor: Reactor, scope: Arc<ResourceScope>, span: Span) -> Self {
        Self {
            reactor,
            scope,
            span,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.reactor.now()
    }

    /// Look up a resource registered in the scope.
    pub fn resource<T>(&self) -> Option<T>
    where
        T: std::any::Any + Clone,
    {
        self.scope.get::<T>()
    }
}
