//! Per-run counters and stop flag.

use std::{
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Final state of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Submitted and, when waited for, confirmed.
    Success,
    /// Failed at any step.
    Failed,
    /// Abandoned at the per-transaction deadline.
    TimedOut,
}

impl Outcome {
    /// Returns the outcome label used in metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and stop signal of a single run.
///
/// Created when a run starts and dropped when it ends. Counters are updated
/// concurrently by every slot.
#[derive(Debug)]
pub struct RunState {
    started: Instant,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    first_success: OnceLock<Duration>,
    stop: CancellationToken,
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    /// Attempts started.
    pub total: u64,
    /// Attempts that succeeded.
    pub success: u64,
    /// Attempts that failed, timeouts included.
    pub failed: u64,
    /// Attempts abandoned at their deadline.
    pub timed_out: u64,
    /// Time from run start to the first success.
    pub first_success: Option<Duration>,
    /// Time since run start.
    pub elapsed: Duration,
}

impl RunCounters {
    /// Successful transactions per second over the elapsed time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.success as f64 / secs } else { 0.0 }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Creates fresh counters with the clock starting now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            first_success: OnceLock::new(),
            stop: CancellationToken::new(),
        }
    }

    /// Counts an attempt that is about to be dispatched.
    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts the outcome of an attempt.
    pub fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
                self.first_success.get_or_init(|| self.started.elapsed());
            }
            Outcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::TimedOut => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns a snapshot of the counters.
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            first_success: self.first_success.get().copied(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Requests the run to stop.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Returns true once a stop was requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Token cancelled when the run stops.
    pub const fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}
