//! ReDoS safety demonstration.
//!
//! Pattern: `(a+)+$` against `"a" * N + "X"`
//!
//! - Backtracking engines: O(2^N), hangs at N=25+
//! - `regex` crate: O(N), microseconds even at N=100
//!
//! The bounded executor adds a deadline on top, so even inputs large enough
//! to be slow in linear time come back within the per-pattern budget.

use ctxi::{RegexExecutor, RegexOutcome};
use regex::Regex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    divan::main();
}

/// The classic ReDoS pattern: nested quantifier with anchor.
const REDOS_PATTERN: &str = r"(a+)+$";

/// Build a pathological input: N 'a's followed by 'X' (forces full backtrack attempt).
fn pathological_input(n: usize) -> String {
    "a".repeat(n) + "X"
}

// ═══════════════════════════════════════════════════════════════════════════════
// Raw regex
// ═══════════════════════════════════════════════════════════════════════════════

#[divan::bench(args = [10, 20, 25, 30, 50, 100])]
fn redos_regex(bencher: divan::Bencher, n: usize) {
    let regex = Regex::new(REDOS_PATTERN).unwrap();
    let input = pathological_input(n);

    bencher.bench_local(|| regex.is_match(divan::black_box(&input)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Through the bounded executor
// ═══════════════════════════════════════════════════════════════════════════════

/// Wait until abandoned jobs from earlier iterations have finished, so every
/// measured call gets a worker instead of a `Rejected` fast path.
fn drain(executor: &RegexExecutor) {
    while executor.pending() > 0 {
        thread::sleep(Duration::from_micros(50));
    }
}

// One iteration per sample, so the drain runs before every measured call.
#[divan::bench(args = [100, 10_000, 1_000_000], sample_size = 1)]
fn redos_bounded(bencher: divan::Bencher, n: usize) {
    let executor = RegexExecutor::new(2, 64).unwrap();
    let regex = Regex::new(REDOS_PATTERN).unwrap();
    let input: Arc<str> = Arc::from(pathological_input(n));

    bencher
        .with_inputs(|| drain(&executor))
        .bench_local_values(|()| {
            let outcome = executor.run(&regex, &input, Duration::from_millis(5));
            assert!(
                matches!(outcome, RegexOutcome::NoMatch | RegexOutcome::TimedOut),
                "unexpected {outcome:?}"
            );
            outcome
        });
}

// ═══════════════════════════════════════════════════════════════════════════════
// Safe regex for comparison (shows dispatch overhead of the executor)
// ═══════════════════════════════════════════════════════════════════════════════

#[divan::bench(args = [10, 50, 100])]
fn safe_regex_bounded(bencher: divan::Bencher, n: usize) {
    let executor = RegexExecutor::new(2, 64).unwrap();
    let regex = Regex::new(r"^a+X$").unwrap();
    let input: Arc<str> = Arc::from(pathological_input(n));

    bencher.bench_local(|| executor.run(&regex, &input, Duration::from_millis(50)));
}
