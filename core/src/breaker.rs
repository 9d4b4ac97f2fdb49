//! Per-rule circuit breaker for chronically slow rules.
//!
//! Closed -> Open after `failure_threshold` recorded failures; Open -> Closed
//! once the cooldown has elapsed (checked lazily in [`CircuitBreaker::is_open`]).
//! A success forgives one failure instead of clearing the count, which damps
//! flapping.
//!
//! State is keyed by rule name and survives reloads. Entries for rules that
//! disappear stay inert.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Longest cooldown actually applied. Larger configured values are clamped
/// so the deadline stays representable as an [`Instant`].
const MAX_COOLDOWN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Breaker bookkeeping for one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakerState {
    pub failure_count: u32,
    /// Set while the breaker is open.
    pub cooldown_until: Option<Instant>,
}

impl BreakerState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.cooldown_until.is_some()
    }
}

struct Inner {
    failure_threshold: u32,
    cooldown: Duration,
    states: HashMap<String, BreakerState>,
}

/// Thread-safe breaker guarding all rules. One lock covers every transition.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// A breaker that opens after `failure_threshold` failures for `cooldown`.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                failure_threshold: failure_threshold.max(1),
                cooldown,
                states: HashMap::new(),
            }),
        }
    }

    /// Change thresholds without forgetting accumulated state.
    pub fn reconfigure(&self, failure_threshold: u32, cooldown: Duration) {
        let mut inner = self.inner.lock();
        inner.failure_threshold = failure_threshold.max(1);
        inner.cooldown = cooldown;
    }

    /// Count one failure. Returns `true` if this call opened the breaker.
    pub fn record_failure(&self, rule: &str) -> bool {
        let mut inner = self.inner.lock();
        let threshold = inner.failure_threshold;
        let cooldown = inner.cooldown;
        let state = inner.states.entry(rule.to_string()).or_default();

        state.failure_count = state.failure_count.saturating_add(1);
        if state.is_open() || state.failure_count < threshold {
            return false;
        }

        let now = Instant::now();
        let until = now
            .checked_add(cooldown.min(MAX_COOLDOWN))
            .or_else(|| now.checked_add(Duration::from_secs(24 * 60 * 60)))
            .unwrap_or(now);
        state.cooldown_until = Some(until);
        warn!(
            rule,
            failures = state.failure_count,
            cooldown_secs = cooldown.as_secs(),
            "circuit breaker opened"
        );
        true
    }

    /// Forgive one failure, never going below zero.
    pub fn record_success(&self, rule: &str) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.states.get_mut(rule) {
            state.failure_count = state.failure_count.saturating_sub(1);
        }
    }

    /// Whether matching for `rule` is currently suspended.
    ///
    /// Closes the breaker (and clears its failures) when the cooldown is over.
    pub fn is_open(&self, rule: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(state) = inner.states.get_mut(rule) else {
            return false;
        };
        match state.cooldown_until {
            Some(until) if Instant::now() >= until => {
                *state = BreakerState::default();
                info!(rule, "circuit breaker closed after cooldown");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Names of rules whose breaker is open right now, sorted.
    #[must_use]
    pub fn open_rules(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let now = Instant::now();
        let mut open: Vec<String> = inner
            .states
            .iter()
            .filter(|(_, s)| s.cooldown_until.is_some_and(|until| now < until))
            .map(|(name, _)| name.clone())
            .collect();
        open.sort();
        open
    }

    /// Snapshot of one rule's state.
    #[must_use]
    pub fn state(&self, rule: &str) -> Option<BreakerState> {
        self.inner.lock().states.get(rule).cloned()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("failure_threshold", &inner.failure_threshold)
            .field("cooldown", &inner.cooldown)
            .field("tracked_rules", &inner.states.len())
            .finish()
    }
}
