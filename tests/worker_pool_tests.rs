#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::test_server::setup_may_runtime;
use smartserve::worker_pool::{WorkerPool, WorkerPoolConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_jobs_run_on_all_workers() {
    setup_may_runtime();
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    let pool = unsafe {
        WorkerPool::new("test", WorkerPoolConfig::new(3, 0x8000), move |n: usize| {
            seen.fetch_add(n, Ordering::SeqCst);
        })
    };
    for n in 1..=10 {
        pool.submit(n).unwrap();
    }
    wait_until(|| pool.metrics().completed() == 10);
    assert_eq!(counter.load(Ordering::SeqCst), 55);
    assert_eq!(pool.metrics().submitted(), 10);
    assert_eq!(pool.metrics().in_flight(), 0);
    assert_eq!(pool.config().num_workers, 3);
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    setup_may_runtime();
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    let pool = unsafe {
        WorkerPool::new("panicky", WorkerPoolConfig::new(1, 0x8000), move |n: usize| {
            if n == 0 {
                panic!("boom");
            }
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };
    pool.submit(0).unwrap();
    pool.submit(1).unwrap();
    pool.submit(2).unwrap();
    wait_until(|| pool.metrics().completed() == 3);
    assert_eq!(pool.metrics().panicked(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}
