//! Engine counters and the snapshot exposed to operators.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters. Cheap to update from any thread.
#[derive(Debug, Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    timeouts: AtomicU64,
    detections: AtomicU64,
    injections: AtomicU64,
    failures: AtomicU64,
    reloads: AtomicU64,
    reload_failures: AtomicU64,
    rule_fires: Mutex<HashMap<String, u64>>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_injection(&self) {
        self.injections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload_failure(&self) {
        self.reload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fire(&self, rule: &str) {
        let mut fires = self.rule_fires.lock();
        match fires.get_mut(rule) {
            Some(count) => *count += 1,
            None => {
                fires.insert(rule.to_string(), 1);
            }
        }
    }

    /// Point-in-time copy of every counter.
    ///
    /// Cache size and open breakers are owned elsewhere and passed in.
    #[must_use]
    pub fn snapshot(&self, cache_size_bytes: usize, open_rules: Vec<String>) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            injections: self.injections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
            rule_fires: self
                .rule_fires
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            cache_size_bytes,
            open_rules,
        }
    }
}

/// Operator-facing view of [`Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timeouts: u64,
    pub detections: u64,
    pub injections: u64,
    pub failures: u64,
    pub reloads: u64,
    pub reload_failures: u64,
    pub rule_fires: BTreeMap<String, u64>,
    pub cache_size_bytes: usize,
    /// Rules whose circuit breaker is open.
    pub open_rules: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_timeout();
        metrics.record_fire("ops");
        metrics.record_fire("ops");
        metrics.record_fire("docs");

        let snap = metrics.snapshot(128, vec!["slow".into()]);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.rule_fires.get("ops"), Some(&2));
        assert_eq!(snap.rule_fires.get("docs"), Some(&1));
        assert_eq!(snap.cache_size_bytes, 128);
        assert_eq!(snap.open_rules, vec!["slow".to_string()]);
    }

    #[test]
    fn snapshot_serializes() {
        let snap = Metrics::new().snapshot(0, Vec::new());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["injections"], 0);
        assert!(json["rule_fires"].as_object().unwrap().is_empty());
    }
}
