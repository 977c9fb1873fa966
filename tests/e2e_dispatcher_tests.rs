//! End-to-end tests for the dispatching service.
//!
//! Ticks are driven by hand against a manual clock, except where the
//! periodic loops themselves are under test.

mod common;

use common::TestDispatcher;
use std::time::Duration;
use wishlist_server::background_jobs::{BaseJob, ErasedJob, Job, JobError};
use wishlist_server::config::DispatcherSettings;

#[tokio::test]
async fn test_due_jobs_start_one_per_tick() {
    let dispatcher = TestDispatcher::new();
    let (past, past_done) = dispatcher.job("past", -1, 3600);
    let (present, present_done) = dispatcher.job("present", 0, 3600);
    let (future, mut future_done) = dispatcher.job("future", 10, 3600);
    dispatcher.dispatch(&future);
    dispatcher.dispatch(&present);
    dispatcher.dispatch(&past);

    let tick = dispatcher.service.run_due_tick();
    assert_eq!(tick.started, Some(past.base().id()));
    tick.settled().await;
    assert_eq!(past_done.await.unwrap(), "past");
    assert_eq!(present.times_run(), 0);

    let tick = dispatcher.service.run_due_tick();
    assert_eq!(tick.started, Some(present.base().id()));
    tick.settled().await;
    assert_eq!(present_done.await.unwrap(), "present");

    assert!(dispatcher.service.run_due_tick().is_idle());
    assert!(dispatcher.is_queued(future.base().id()));
    assert!(future_done.try_outcome().is_none());
    assert_eq!(future.times_run(), 0);
}

#[tokio::test]
async fn test_expired_job_fails_overdue_without_running() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("late", 100, -1);
    let id = dispatcher.dispatch(&job);

    let expired = dispatcher.service.expire_overdue_tick().await;

    assert_eq!(expired, vec![id]);
    assert_eq!(completion.await, Err(JobError::Overdue));
    assert!(!dispatcher.is_queued(id));
    assert_eq!(dispatcher.handle.pending_count(), 0);

    // Reaching the scheduled time later does not revive it.
    dispatcher.advance(200);
    assert!(dispatcher.service.run_due_tick().is_idle());
    assert_eq!(job.times_run(), 0);
}

#[tokio::test]
async fn test_job_cancelled_by_overdue_is_discarded_by_run_tick() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("stale", -5, 3600);
    let id = dispatcher.dispatch(&job);

    let ctx = dispatcher
        .service
        .context_for(&ErasedJob::from_arc(job.clone()))
        .unwrap();
    job.overdue(&ctx).await;
    assert!(job.base().is_cancelled());

    let tick = dispatcher.service.run_due_tick();
    assert_eq!(tick.discarded, vec![id]);
    assert!(tick.started.is_none());
    tick.settled().await;

    assert_eq!(job.times_run(), 0);
    assert_eq!(completion.await, Err(JobError::Overdue));
    assert!(!dispatcher.is_queued(id));
}

#[tokio::test]
async fn test_failed_run_reports_error_and_queue_moves_on() {
    let dispatcher = TestDispatcher::new();
    let (broken, broken_done) = dispatcher.failing_job("out of stock", -2, 3600);
    let (next, next_done) = dispatcher.job("next", -1, 3600);
    dispatcher.dispatch(&broken);
    dispatcher.dispatch(&next);

    dispatcher.service.run_due_tick().settled().await;
    assert_eq!(
        broken_done.await,
        Err(JobError::ExecutionFailed("out of stock".to_string()))
    );

    let tick = dispatcher.service.run_due_tick();
    assert_eq!(tick.started, Some(next.base().id()));
    tick.settled().await;
    assert_eq!(next_done.await.unwrap(), "next");
    assert_eq!(broken.times_run(), 1);
}

#[tokio::test]
async fn test_jobs_start_in_scheduled_order() {
    let dispatcher = TestDispatcher::new();
    let offsets = [-3, -9, -1, -7, -5, -7];
    let jobs: Vec<_> = offsets
        .iter()
        .map(|offset| dispatcher.job(&offset.to_string(), *offset, 3600).0)
        .collect();
    for job in &jobs {
        dispatcher.dispatch(job);
    }

    let mut started = Vec::new();
    loop {
        let tick = dispatcher.service.run_due_tick();
        let Some(id) = tick.started else {
            break;
        };
        tick.settled().await;
        started.push(id);
    }

    let scheduled: Vec<_> = started
        .iter()
        .map(|id| {
            jobs.iter()
                .find(|job| job.base().id() == *id)
                .unwrap()
                .base()
                .scheduled()
        })
        .collect();
    assert_eq!(started.len(), offsets.len());
    assert!(scheduled.windows(2).all(|w| w[0] <= w[1]));

    // Equal scheduled times start in dispatch order.
    let ties: Vec<_> = started
        .iter()
        .filter(|id| {
            **id == jobs[3].base().id() || **id == jobs[5].base().id()
        })
        .collect();
    assert_eq!(ties, vec![&jobs[3].base().id(), &jobs[5].base().id()]);
}

#[tokio::test]
async fn test_duplicate_dispatch_leaves_single_entry() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("once", -1, 3600);
    let id = dispatcher.dispatch(&job);

    assert_eq!(
        dispatcher.handle.dispatch_shared(job.clone()),
        Err(JobError::AlreadyDispatched(id))
    );
    assert_eq!(dispatcher.handle.pending_jobs().len(), 1);

    dispatcher.service.run_due_tick().settled().await;
    assert_eq!(completion.await.unwrap(), "once");
    assert!(!dispatcher.is_queued(id));
    assert!(dispatcher.service.run_due_tick().is_idle());
    assert_eq!(job.times_run(), 1);
}

#[tokio::test]
async fn test_finished_job_is_never_dispatched_again() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("once", -1, 3600);
    let id = dispatcher.dispatch(&job);

    dispatcher.service.run_due_tick().settled().await;
    assert_eq!(completion.await.unwrap(), "once");

    assert_eq!(
        dispatcher.handle.dispatch_shared(job.clone()),
        Err(JobError::AlreadyTerminated(id))
    );
    assert_eq!(dispatcher.handle.pending_count(), 0);
    assert!(dispatcher.service.run_due_tick().is_idle());
    assert_eq!(job.times_run(), 1);
}

#[tokio::test]
async fn test_expired_job_is_never_dispatched_again() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("late", 10, -1);
    let id = dispatcher.dispatch(&job);

    assert_eq!(dispatcher.service.expire_overdue_tick().await, vec![id]);
    assert_eq!(completion.await, Err(JobError::Overdue));

    assert_eq!(
        dispatcher.handle.dispatch_shared(job.clone()),
        Err(JobError::AlreadyTerminated(id))
    );
    dispatcher.advance(20);
    assert!(dispatcher.service.run_due_tick().is_idle());
    assert_eq!(job.times_run(), 0);
}

#[tokio::test]
async fn test_overdue_job_never_also_succeeds() {
    let dispatcher = TestDispatcher::new();
    let (job, completion) = dispatcher.job("race", -10, -1);
    let id = dispatcher.dispatch(&job);

    // The run tick sees a due job whose deadline has passed.
    let tick = dispatcher.service.run_due_tick();
    assert_eq!(tick.expired, Some(id));
    tick.settled().await;

    assert!(dispatcher.service.expire_overdue_tick().await.is_empty());
    assert_eq!(completion.await, Err(JobError::Overdue));
    assert_eq!(job.times_run(), 0);
}

#[tokio::test]
async fn test_running_loops_process_jobs() {
    let dispatcher = TestDispatcher::with_settings(DispatcherSettings {
        run_tick_interval: Duration::from_millis(10),
        expire_tick_interval: Duration::from_millis(10),
    });
    let (due, due_done) = dispatcher.job("due", -1, 3600);
    let (expired, expired_done) = dispatcher.job("expired", 50, -1);
    dispatcher.dispatch(&due);
    dispatcher.dispatch(&expired);

    dispatcher.service.start();
    assert!(dispatcher.handle.is_running());

    let due_outcome = tokio::time::timeout(Duration::from_secs(5), due_done)
        .await
        .expect("due job should finish while the loops run");
    let expired_outcome = tokio::time::timeout(Duration::from_secs(5), expired_done)
        .await
        .expect("expired job should be reported while the loops run");

    dispatcher.service.stop().await;

    assert_eq!(due_outcome.unwrap(), "due");
    assert_eq!(expired_outcome, Err(JobError::Overdue));
    assert!(!dispatcher.handle.is_running());
    assert_eq!(dispatcher.handle.pending_count(), 0);
}

#[tokio::test]
async fn test_stopped_dispatcher_keeps_pending_jobs() {
    let dispatcher = TestDispatcher::with_settings(DispatcherSettings {
        run_tick_interval: Duration::from_millis(10),
        expire_tick_interval: Duration::from_millis(10),
    });
    dispatcher.service.start();
    dispatcher.service.stop().await;

    let (job, mut completion) = dispatcher.job("parked", -1, 3600);
    dispatcher.dispatch(&job);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(job.times_run(), 0);
    assert!(completion.try_outcome().is_none());
    assert_eq!(dispatcher.handle.pending_count(), 1);
}
