//! # Worker Pool Module
//!
//! A fixed set of coroutines draining one shared job queue. The server
//! submits every accepted connection here; whichever worker is idle picks
//! it up.
//!
//! ## Features
//!
//! - **Shared Queue**: all workers `recv` from one `may` MPSC channel
//! - **Panic Isolation**: a panicking job is logged and the worker keeps going
//! - **Metrics**: submitted, completed, in-flight and panicked job counts
//! - **Shutdown**: dropping the pool drops the sender; workers finish what is
//!   queued and exit when the channel closes
//!
//! ## Configuration
//!
//! - `worker_threads` in the server configuration sets the worker count
//! - `SMARTSERVE_STACK_SIZE` sets the coroutine stack size (default 64 KiB)

use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::runtime_config::RuntimeConfig;

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            stack_size,
        }
    }

    /// `num_workers` workers with the stack size from the environment.
    pub fn from_env(num_workers: usize) -> Self {
        Self::new(num_workers, RuntimeConfig::from_env().stack_size)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            stack_size: 0x10000, // 64KB
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicUsize,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Jobs submitted but not yet finished (queued or running).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Fixed-size pool of coroutines running `J` jobs.
pub struct WorkerPool<J: Send + 'static> {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<J>,
    metrics: Arc<WorkerPoolMetrics>,
    name: String,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Spawn the workers.
    ///
    /// # Safety
    ///
    /// Spawns coroutines with `may::coroutine::Builder::spawn()`, which is
    /// unsafe in the `may` runtime. The caller must ensure the runtime is
    /// configured and that `job_fn` does not use thread-local storage across
    /// yield points.
    pub unsafe fn new<F>(name: impl Into<String>, config: WorkerPoolConfig, job_fn: F) -> Self
    where
        F: Fn(J) + Send + Clone + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<J>();
        let metrics = Arc::new(WorkerPoolMetrics::new());
        let rx = Arc::new(rx);

        info!(
            pool = %name,
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let job_fn = job_fn.clone();
            let pool_name = name.clone();
            let metrics = Arc::clone(&metrics);

            let spawn_result = may::coroutine::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(pool = %pool_name, worker_id, "Worker coroutine started");

                    // all workers share one receiver; recv fails once the
                    // sender is dropped and the queue is empty
                    while let Ok(job) = rx.recv() {
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job_fn(job)))
                        {
                            metrics.record_panic();
                            error!(
                                pool = %pool_name,
                                worker_id,
                                panic_message = ?panic,
                                "Job panicked"
                            );
                        }
                        metrics.record_completion();
                    }

                    debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
            name,
        }
    }

    /// Queue a job. Fails only when every worker has exited.
    pub fn submit(&self, job: J) -> Result<(), J> {
        self.metrics.record_submit();
        if let Err(err) = self.sender.send(job) {
            self.metrics.record_completion();
            error!(pool = %self.name, "Worker pool channel disconnected");
            return Err(err.0);
        }
        Ok(())
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}
