use super::erased::ErasedJob;
use super::heap::PriorityQueue;
use super::job::JobId;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Which instant a [`DispatchingQueue`] orders its jobs by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOrder {
    /// Earlier scheduled time first.
    Scheduled,
    /// Earlier deadline first.
    Deadline,
}

impl JobOrder {
    pub fn key(&self, job: &ErasedJob) -> DateTime<Utc> {
        match self {
            JobOrder::Scheduled => job.scheduled(),
            JobOrder::Deadline => job.deadline(),
        }
    }
}

impl std::fmt::Display for JobOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOrder::Scheduled => write!(f, "scheduled"),
            JobOrder::Deadline => write!(f, "deadline"),
        }
    }
}

struct QueueEntry {
    key: DateTime<Utc>,
    /// Enqueue sequence number; equal keys come out in insertion order.
    seq: u64,
    job: ErasedJob,
}

fn entry_comes_before(a: &QueueEntry, b: &QueueEntry) -> bool {
    (a.key, a.seq) < (b.key, b.seq)
}

struct QueueState {
    heap: PriorityQueue<QueueEntry>,
    next_seq: u64,
}

/// Time-ordered queue of pending jobs.
///
/// Every operation takes the internal lock for its whole duration, so each
/// one is atomic with respect to the others. The lock is never held across
/// an await point.
pub struct DispatchingQueue {
    order: JobOrder,
    state: Mutex<QueueState>,
}

impl DispatchingQueue {
    pub fn new(order: JobOrder) -> Self {
        Self {
            order,
            state: Mutex::new(QueueState {
                heap: PriorityQueue::new(entry_comes_before),
                next_seq: 0,
            }),
        }
    }

    pub fn order(&self) -> JobOrder {
        self.order
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, job: ErasedJob) {
        let key = self.order.key(&job);
        let mut state = self.state();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueueEntry { key, seq, job });
    }

    /// Remove and return the job that comes first.
    pub fn dequeue(&self) -> Option<ErasedJob> {
        self.state().heap.pop().map(|entry| entry.job)
    }

    /// Remove and return the head only if `predicate` accepts it.
    ///
    /// Peek and removal happen under one lock, so nothing can take the head
    /// in between.
    pub fn dequeue_if<P>(&self, predicate: P) -> Option<ErasedJob>
    where
        P: FnOnce(&ErasedJob) -> bool,
    {
        let mut state = self.state();
        let accepted = state.heap.peek().is_some_and(|head| predicate(&head.job));
        if accepted {
            state.heap.pop().map(|entry| entry.job)
        } else {
            None
        }
    }

    /// Remove a specific job, wherever it sits. Returns false if it was not queued.
    pub fn dequeue_job(&self, job: &ErasedJob) -> bool {
        self.dequeue_id(job.id()).is_some()
    }

    pub fn dequeue_id(&self, id: JobId) -> Option<ErasedJob> {
        self.state()
            .heap
            .remove_where(|entry| entry.job.id() == id)
            .map(|entry| entry.job)
    }

    pub fn peek(&self) -> Option<ErasedJob> {
        self.state().heap.peek().map(|entry| entry.job.clone())
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.state().heap.iter().any(|entry| entry.job.id() == id)
    }

    /// Copy of the queued jobs, ordered as they would be dequeued.
    pub fn snapshot(&self) -> Vec<ErasedJob> {
        let mut entries: Vec<(DateTime<Utc>, u64, ErasedJob)> = self
            .state()
            .heap
            .iter()
            .map(|entry| (entry.key, entry.seq, entry.job.clone()))
            .collect();
        entries.sort_by_key(|(key, seq, _)| (*key, *seq));
        entries.into_iter().map(|(_, _, job)| job).collect()
    }

    pub fn len(&self) -> usize {
        self.state().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().heap.is_empty()
    }
}

impl std::fmt::Debug for DispatchingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchingQueue")
            .field("order", &self.order)
            .field("len", &self.len())
            .finish()
    }
}
