//! Bounded regex executor.
//!
//! Runs each regex match on a small dedicated worker pool and waits at most
//! a fixed deadline for the answer. A late answer is discarded and the call
//! reports [`RegexOutcome::TimedOut`]; the worker finishes in the background.
//!
//! The `regex` crate is linear time, so catastrophic backtracking cannot
//! happen. Very large inputs or automata can still be slow, and the deadline
//! is what callers rely on, so every match goes through here.
//!
//! A job that waited in the queue for more than half its deadline (or never
//! started) reports [`RegexOutcome::Starved`] instead of
//! [`RegexOutcome::TimedOut`]: the time went to other work, not to this one.
//!
//! Abandoned work is bounded: at most `max_pending` jobs may be submitted but
//! unfinished at once. Beyond that, [`run`](RegexExecutor::run) returns
//! [`RegexOutcome::Rejected`] without queueing anything.

use regex::Regex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::warn;

/// The result of one bounded match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexOutcome {
    /// The pattern matched within the deadline.
    Matched,
    /// The pattern did not match within the deadline.
    NoMatch,
    /// The job ran for the whole deadline without answering.
    TimedOut,
    /// The deadline elapsed while the job waited for a worker.
    Starved,
    /// Too much outstanding work; the match was never attempted.
    Rejected,
    /// The worker died without answering.
    Failed,
}

/// The worker pool could not be started.
#[derive(Debug, thiserror::Error)]
#[error("failed to start regex worker pool: {0}")]
pub struct ExecutorError(#[from] rayon::ThreadPoolBuildError);

/// Fixed-size pool that evaluates regex matches under a deadline.
pub struct RegexExecutor {
    pool: rayon::ThreadPool,
    workers: usize,
    max_pending: usize,
    pending: Arc<AtomicUsize>,
}

impl RegexExecutor {
    /// Start a pool with `workers` threads and at most `max_pending`
    /// outstanding jobs.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] if the threads cannot be spawned.
    pub fn new(workers: usize, max_pending: usize) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ctxi-regex-{i}"))
            // rayon aborts on an unhandled panic in `spawn`.
            .panic_handler(|_| warn!("regex worker panicked"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            max_pending: max_pending.max(1),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Match `regex` against `text`, waiting at most `timeout`.
    ///
    /// `text` is shared with the worker, so one allocation serves every
    /// pattern of a request.
    pub fn run(&self, regex: &Regex, text: &Arc<str>, timeout: Duration) -> RegexOutcome {
        let regex = regex.clone();
        let text = Arc::clone(text);
        self.run_job(move || regex.is_match(&text), timeout)
    }

    /// Run an arbitrary boolean job under the same deadline and pending cap.
    pub fn run_job<F>(&self, job: F, timeout: Duration) -> RegexOutcome
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let Some(slot) = PendingSlot::acquire(&self.pending, self.max_pending) else {
            warn!(
                max_pending = self.max_pending,
                "regex executor saturated, rejecting match"
            );
            return RegexOutcome::Rejected;
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let submitted = Instant::now();
        let started = Arc::new(OnceLock::new());
        let started_on_worker = Arc::clone(&started);
        self.pool.spawn(move || {
            let _slot = slot;
            let _ = started_on_worker.set(Instant::now());
            let matched = job();
            // The caller may have given up already.
            let _ = tx.send(matched);
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => RegexOutcome::Matched,
            Ok(false) => RegexOutcome::NoMatch,
            Err(RecvTimeoutError::Timeout) => match started.get() {
                // Queued for at most half the deadline: the job had its turn.
                Some(at) if at.duration_since(submitted) <= timeout / 2 => {
                    RegexOutcome::TimedOut
                }
                _ => RegexOutcome::Starved,
            },
            Err(RecvTimeoutError::Disconnected) => RegexOutcome::Failed,
        }
    }

    /// Jobs submitted but not yet finished, including abandoned ones.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }
}

impl fmt::Debug for RegexExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexExecutor")
            .field("workers", &self.workers)
            .field("max_pending", &self.max_pending)
            .field("pending", &self.pending())
            .finish()
    }
}

/// One reserved unit of the pending budget. Released on drop, including
/// when the job panics.
struct PendingSlot(Arc<AtomicUsize>);

impl PendingSlot {
    fn acquire(pending: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(pending)))
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Split a rule's regex budget across its patterns.
///
/// Each pattern gets `total / patterns`, but never less than `floor`. When
/// the floor pushes the sum past `total` a warning is logged and the floor
/// still applies.
#[must_use]
pub fn per_pattern_budget(total: Duration, patterns: usize, floor: Duration) -> Duration {
    if patterns == 0 {
        return total;
    }
    let count = u32::try_from(patterns).unwrap_or(u32::MAX);
    let floored_sum = floor.saturating_mul(count);
    if floored_sum > total {
        warn!(
            patterns,
            floor_ms = floor.as_millis() as u64,
            total_ms = total.as_millis() as u64,
            "per-pattern timeout floor exceeds the rule's total regex budget"
        );
    }
    (total / count).max(floor)
}
