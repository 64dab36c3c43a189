//! # Worker Pool
//!
//! Fixed set of named threads executing independently runnable jobs.
//!
//! ## Architecture
//!
//! ```text
//!                              ┌──> [reset-worker-0] ──┐
//!   Main thread ──> spawn ──> rayon ──> [reset-worker-1] ──┼──> jobs run to completion
//!    (submit)              registry └──> [reset-worker-N] ──┘
//! ```
//!
//! Jobs go straight to a `rayon::ThreadPool` via `spawn`. A panicking job
//! reaches the pool's panic handler, which counts and logs it; the worker
//! thread survives and picks up the next job.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::ResetConfig;
use crate::error::PoolError;
use crate::sync::CompletionBarrier;
use crate::task::panic_message;

/// A unit of work accepted by an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run independently runnable jobs.
pub trait Executor: Send + Sync {
    /// Submits a job for execution.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the executor no longer accepts
    /// work. The rejected job is dropped without running.
    fn execute(&self, job: Job) -> Result<(), PoolError>;
}

/// Executor that runs each job on the calling thread.
///
/// Used when the reset phase is configured with zero workers.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(panic = %panic_message(payload.as_ref()), "inline job panicked");
        }
        Ok(())
    }
}

/// Counters shared between the pool handle and its threads.
#[derive(Debug, Default)]
struct PoolCounters {
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Fixed-size `rayon` thread pool behind the [`Executor`] seam.
pub struct WorkerPool {
    /// The rayon pool. `None` once shut down.
    pool: RwLock<Option<rayon::ThreadPool>>,
    /// Released once every worker thread has exited.
    exited: Arc<CompletionBarrier>,
    /// Job counters.
    counters: Arc<PoolCounters>,
    /// Number of worker threads.
    threads: usize,
}

impl WorkerPool {
    /// Builds a pool of `threads` workers named `{name_prefix}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Build`] if rayon cannot start the pool.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero.
    pub fn new(threads: usize, name_prefix: &str) -> Result<Self, PoolError> {
        assert!(threads > 0, "Worker pool needs at least one thread");

        let counters = Arc::new(PoolCounters::default());
        let exited = Arc::new(CompletionBarrier::new(threads));

        let prefix = name_prefix.to_string();
        let panics = Arc::clone(&counters);
        let exits = Arc::clone(&exited);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(move |payload| {
                panics.panicked.fetch_add(1, Ordering::AcqRel);
                tracing::error!(
                    worker = std::thread::current().name().unwrap_or("unnamed"),
                    panic = %panic_message(payload.as_ref()),
                    "job panicked; worker continues"
                );
            })
            .exit_handler(move |_| {
                exits.arrive();
            })
            .build()?;

        tracing::debug!(threads, prefix = name_prefix, "worker pool started");

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            exited,
            counters,
            threads,
        })
    }

    /// Builds a pool sized by `config`.
    ///
    /// A config with zero workers still gets one thread here; use
    /// [`build_executor`] to honour the inline setting.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Build`] if rayon cannot start the pool.
    pub fn from_config(config: &ResetConfig) -> Result<Self, PoolError> {
        Self::new(config.worker_threads.max(1), &config.thread_name)
    }

    /// Returns the number of worker threads.
    #[inline]
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns the number of jobs that ran to completion.
    #[must_use]
    pub fn jobs_completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Acquire)
    }

    /// Returns the number of jobs that panicked.
    #[must_use]
    pub fn jobs_panicked(&self) -> u64 {
        self.counters.panicked.load(Ordering::Acquire)
    }

    /// Returns true once the pool has been shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.pool.read().is_none()
    }

    /// Stops accepting jobs and waits for every worker to exit.
    ///
    /// Jobs already spawned still run. Idempotent. Called from one of the
    /// pool's own threads it returns without waiting.
    pub fn shutdown(&self) {
        let Some(pool) = self.pool.write().take() else {
            return;
        };

        let on_worker = pool.current_thread_index().is_some();
        drop(pool);
        if !on_worker {
            // Threads exit once their spawned jobs are done.
            let _ = self.exited.wait();
        }

        tracing::debug!(
            completed = self.jobs_completed(),
            panicked = self.jobs_panicked(),
            "worker pool shut down"
        );
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<(), PoolError> {
        let pool = self.pool.read();
        let pool = pool.as_ref().ok_or(PoolError::ShutDown)?;

        let counters = Arc::clone(&self.counters);
        pool.spawn(move || {
            job();
            counters.completed.fetch_add(1, Ordering::AcqRel);
        });
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("completed", &self.jobs_completed())
            .field("panicked", &self.jobs_panicked())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Builds the executor described by `config`.
///
/// Zero workers gives an [`InlineExecutor`]; anything else a [`WorkerPool`].
///
/// # Errors
///
/// Returns [`PoolError::Build`] if the worker pool cannot start.
pub fn build_executor(config: &ResetConfig) -> Result<Arc<dyn Executor>, PoolError> {
    if config.worker_threads == 0 {
        Ok(Arc::new(InlineExecutor))
    } else {
        Ok(Arc::new(WorkerPool::from_config(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_runs_every_job() {
        let pool = WorkerPool::new(4, "test-pool").unwrap();
        let barrier = Arc::new(CompletionBarrier::new(100));

        for _ in 0..100 {
            let barrier = Arc::clone(&barrier);
            pool.execute(Box::new(move || {
                barrier.arrive();
            }))
            .unwrap();
        }

        barrier.wait_timeout(Duration::from_secs(10)).unwrap();
        pool.shutdown();
        assert_eq!(pool.jobs_completed(), 100);
        assert_eq!(pool.threads(), 4);
    }

    #[test]
    fn test_jobs_spread_across_named_threads() {
        let pool = WorkerPool::new(3, "named").unwrap();
        let names = Arc::new(Mutex::new(HashSet::new()));
        let barrier = Arc::new(CompletionBarrier::new(60));

        for _ in 0..60 {
            let names = Arc::clone(&names);
            let barrier = Arc::clone(&barrier);
            pool.execute(Box::new(move || {
                let name = thread::current().name().unwrap_or_default().to_string();
                names.lock().insert(name);
                thread::sleep(Duration::from_millis(1));
                barrier.arrive();
            }))
            .unwrap();
        }

        barrier.wait_timeout(Duration::from_secs(10)).unwrap();
        let names = names.lock();
        assert!(!names.is_empty());
        assert!(names.len() <= 3);
        for name in names.iter() {
            let index: usize = name
                .strip_prefix("named-")
                .and_then(|index| index.parse().ok())
                .unwrap_or_else(|| panic!("unexpected worker name {name:?}"));
            assert!(index < 3);
        }
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, "panicky").unwrap();
        let barrier = Arc::new(CompletionBarrier::new(1));

        pool.execute(Box::new(|| panic!("bad job"))).unwrap();
        let done = Arc::clone(&barrier);
        pool.execute(Box::new(move || {
            done.arrive();
        }))
        .unwrap();

        barrier.wait_timeout(Duration::from_secs(10)).unwrap();
        pool.shutdown();
        assert_eq!(pool.jobs_panicked(), 1);
        assert_eq!(pool.jobs_completed(), 1);
    }

    #[test]
    fn test_panics_counted_across_threads() {
        let pool = WorkerPool::new(4, "many-panics").unwrap();

        for i in 0..40 {
            pool.execute(Box::new(move || {
                assert!(i % 4 != 0, "job {i} fails");
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(pool.jobs_panicked(), 10);
        assert_eq!(pool.jobs_completed(), 30);
    }

    #[test]
    fn test_shutdown_waits_for_spawned_jobs() {
        let pool = WorkerPool::new(2, "draining").unwrap();

        for _ in 0..8 {
            pool.execute(Box::new(|| thread::sleep(Duration::from_millis(5))))
                .unwrap();
        }

        pool.shutdown();
        assert_eq!(pool.jobs_completed(), 8);
    }

    #[test]
    fn test_execute_after_shutdown_drops_job() {
        let pool = WorkerPool::new(2, "closed").unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shut_down());

        let token = Arc::new(());
        let held = Arc::clone(&token);
        let result = pool.execute(Box::new(move || drop(held)));

        assert!(matches!(result, Err(PoolError::ShutDown)));
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn test_inline_executor_runs_immediately() {
        let barrier = Arc::new(CompletionBarrier::new(1));
        let done = Arc::clone(&barrier);

        InlineExecutor
            .execute(Box::new(move || {
                done.arrive();
            }))
            .unwrap();

        assert!(barrier.is_complete());
        assert!(InlineExecutor.execute(Box::new(|| panic!("contained"))).is_ok());
    }

    #[test]
    fn test_build_executor_honours_inline_setting() {
        let inline = ResetConfig {
            worker_threads: 0,
            ..ResetConfig::default()
        };
        let barrier = Arc::new(CompletionBarrier::new(1));
        let done = Arc::clone(&barrier);

        let executor = build_executor(&inline).unwrap();
        executor
            .execute(Box::new(move || {
                done.arrive();
            }))
            .unwrap();
        assert!(barrier.is_complete());
    }
}
