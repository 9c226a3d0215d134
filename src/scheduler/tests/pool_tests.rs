//! Worker pool bounds and draining.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::rstest;
use tokio::sync::Notify;

use crate::scheduler::{PoolSettings, SchedulerError, WorkerPool};

use super::support::settle;

fn single_slot_pool() -> WorkerPool {
    WorkerPool::start(PoolSettings {
        concurrency: 1,
        queue_capacity: 1,
    })
    .expect("runtime available")
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn a_saturated_pool_queues_exactly_its_capacity() {
    let pool = single_slot_pool();
    let gate = Arc::new(Notify::new());
    let blocked = {
        let release = Arc::clone(&gate);
        async move { release.notified().await }
    };

    pool.submit(blocked).expect("first job runs");
    settle().await;
    pool.submit(async {}).expect("second job fills the queue");
    settle().await;
    let refused = pool.submit(async {});

    assert!(matches!(refused, Err(SchedulerError::QueueFull)));
    gate.notify_one();
    pool.shutdown().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn concurrency_is_capped() {
    let pool = WorkerPool::start(PoolSettings {
        concurrency: 2,
        queue_capacity: 16,
    })
    .expect("runtime available");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
        let running = Arc::clone(&active);
        let highest = Arc::clone(&peak);
        pool.submit(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            highest.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        })
        .expect("queued");
    }

    pool.shutdown().await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn shutdown_drains_queued_jobs_then_refuses_more() {
    let pool = single_slot_pool();
    let finished = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let counter = Arc::clone(&finished);
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("queued");
        settle().await;
    }

    pool.shutdown().await;

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert!(matches!(pool.submit(async {}), Err(SchedulerError::ShutDown)));
}

#[rstest]
fn the_pool_needs_a_runtime() {
    assert!(matches!(
        WorkerPool::start(PoolSettings::default()),
        Err(SchedulerError::NoRuntime)
    ));
}
