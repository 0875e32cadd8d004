//! # Recognition Worker Pool
//!
//! Bounded execution slots for CPU-bound recognition calls. A session task
//! reserves a slot (with a timeout, so saturation surfaces as a retryable
//! error instead of unbounded queueing), then runs its blocking job on the
//! runtime's blocking thread set. The permit travels into the job, so a slot
//! is released only when the work actually finishes; a job abandoned by a
//! run timeout keeps its slot until it completes, and its result is
//! discarded by the caller.
//!
//! ## Usage:
//! - [`RecognitionPool::reserve`] + [`PoolSlot::run`] when the caller needs
//!   to keep ownership of captured state on reservation failure
//! - [`RecognitionPool::submit`] when the job can be handed over directly

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Number of slots matching the machine's CPU parallelism.
pub fn default_slots() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently executing jobs.
    pub slots: usize,
    /// How long a reservation may wait before reporting saturation.
    pub acquire_timeout: Duration,
    /// Optional cap on a single job's execution time.
    pub run_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            acquire_timeout: Duration::from_secs(5),
            run_timeout: None,
        }
    }
}

/// Failures surfaced by the pool. Saturation and run timeouts are
/// transient: the job had no effect on caller state (a timed-out job's
/// result is discarded) and may be resubmitted.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolError {
    Saturated { waited: Duration },
    Timeout { limit: Duration },
    Closed,
    Worker(String),
}

impl PoolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::Saturated { .. } | PoolError::Timeout { .. })
    }
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Saturated { waited } => {
                write!(f, "pool saturated after waiting {:?}", waited)
            }
            PoolError::Timeout { limit } => write!(f, "job exceeded run limit {:?}", limit),
            PoolError::Closed => write!(f, "pool is closed"),
            PoolError::Worker(msg) => write!(f, "worker failed: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

#[derive(Debug, Default)]
struct PoolCounters {
    active: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub slots: usize,
    pub active: usize,
    pub peak_active: usize,
    pub completed: u64,
    pub rejected: u64,
    pub timed_out: u64,
}

pub struct RecognitionPool {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
    counters: Arc<PoolCounters>,
}

impl RecognitionPool {
    pub fn new(config: PoolConfig) -> Self {
        debug!(slots = config.slots, "recognition pool created");
        Self {
            semaphore: Arc::new(Semaphore::new(config.slots)),
            config,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Wait for a free slot, up to the configured acquire timeout.
    pub async fn reserve(&self) -> Result<PoolSlot, PoolError> {
        let started = Instant::now();
        let acquired = timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;

        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::Saturated {
                    waited: started.elapsed(),
                });
            }
        };

        Ok(PoolSlot {
            permit,
            run_timeout: self.config.run_timeout,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Reserve and run in one step.
    pub async fn submit<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.reserve().await?.run(job).await
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            slots: self.config.slots,
            active: self.counters.active.load(Ordering::Relaxed),
            peak_active: self.counters.peak_active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// A reserved slot. Dropping it unused releases the slot immediately.
#[derive(Debug)]
pub struct PoolSlot {
    permit: OwnedSemaphorePermit,
    run_timeout: Option<Duration>,
    counters: Arc<PoolCounters>,
}

impl PoolSlot {
    /// Execute a blocking job on this slot. With a run timeout configured,
    /// expiry abandons the job (it still runs to completion and only then
    /// frees the slot) and reports [`PoolError::Timeout`].
    pub async fn run<F, T>(self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let PoolSlot {
            permit,
            run_timeout,
            counters,
        } = self;
        let job_counters = Arc::clone(&counters);

        let handle = task::spawn_blocking(move || {
            let _permit = permit;
            let running = RunningJob::track(job_counters);
            let out = job();
            running.finish();
            out
        });

        match run_timeout {
            Some(limit) => match timeout(limit, handle).await {
                Ok(joined) => joined.map_err(|err| PoolError::Worker(err.to_string())),
                Err(_) => {
                    counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    Err(PoolError::Timeout { limit })
                }
            },
            None => handle
                .await
                .map_err(|err| PoolError::Worker(err.to_string())),
        }
    }
}

/// In-flight job marker. The active gauge is incremented on creation and
/// decremented on drop, so a job that panics mid-run still releases its
/// count during unwind. Only [`finish`](Self::finish) counts a completion.
struct RunningJob {
    counters: Arc<PoolCounters>,
}

impl RunningJob {
    fn track(counters: Arc<PoolCounters>) -> Self {
        let active = counters.active.fetch_add(1, Ordering::Relaxed) + 1;
        counters.peak_active.fetch_max(active, Ordering::Relaxed);
        Self { counters }
    }

    fn finish(&self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for RunningJob {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}
