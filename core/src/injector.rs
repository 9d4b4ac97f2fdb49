//! The injection orchestrator: the engine's public entry point.
//!
//! An [`Injector`] owns the three pieces of shared mutable state (the active
//! [`RuleSet`], the [`ContentCache`] and the [`CircuitBreaker`]), each behind
//! its own lock. It is constructed explicitly and passed around by the
//! caller; there is no global instance.
//!
//! ```text
//! text + caller ─▶ RuleSet snapshot ─▶ Scorer (RegexExecutor, CircuitBreaker)
//!                                         │
//!                      ranked matches ◀───┘
//!                            │
//!                            ▼
//!                ContentCache ─▶ merged payload + notifications
//! ```
//!
//! Nothing here fails the caller's request. Panics during detection or
//! loading are contained at the boundary, logged and counted, and the
//! payload comes back untouched.

use crate::payload::Payload;
use crate::scorer::{MatchResult, Scorer, ScoringInput};
use crate::{
    compile, CircuitBreaker, ConfigError, ConfigSource, ConfigValidator, ContentCache,
    ContentLoadError, ContentReader, ExecutorError, InjectionError, InjectorConfig, Metrics,
    MetricsSnapshot, RegexExecutor, RuleSet, SchemaValidator, DRY_RUN_MARKER,
};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What [`Injector::inject`] hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection<P> {
    /// The payload, modified only if `injected` is true.
    pub payload: P,
    /// Caller-facing notices, in match order.
    pub notifications: Vec<String>,
    /// Whether context was merged into the payload.
    pub injected: bool,
}

impl<P> Injection<P> {
    fn unchanged(payload: P) -> Self {
        Self {
            payload,
            notifications: Vec::new(),
            injected: false,
        }
    }
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    /// Rules in the newly active set.
    pub rules: usize,
    /// Rules in the set it replaced.
    pub previous_rules: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Assembles an [`Injector`] from its collaborators.
///
/// The initial rule set comes from [`config`](Self::config) if given,
/// otherwise from the [`source`](Self::source). An initial config that fails
/// validation or compilation is logged and replaced by the disabled default.
pub struct InjectorBuilder {
    reader: Box<dyn ContentReader>,
    config: Option<InjectorConfig>,
    source: Option<Box<dyn ConfigSource>>,
    validator: Box<dyn ConfigValidator>,
}

impl InjectorBuilder {
    pub fn new(reader: impl ContentReader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            config: None,
            source: None,
            validator: Box::new(SchemaValidator),
        }
    }

    #[must_use]
    pub fn config(mut self, config: InjectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Where [`Injector::reload`] reads from.
    #[must_use]
    pub fn source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Replace the built-in [`SchemaValidator`].
    #[must_use]
    pub fn validator(mut self, validator: impl ConfigValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Build the injector and start its regex worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] if the worker pool cannot be started.
    pub fn build(self) -> Result<Injector, ExecutorError> {
        let initial = match &self.config {
            Some(config) => compile(config),
            None => match &self.source {
                Some(source) => source
                    .load()
                    .and_then(|raw| InjectorConfig::from_value(raw, self.validator.as_ref()))
                    .and_then(|config| compile(&config)),
                None => Ok(RuleSet::disabled()),
            },
        };
        let rules = initial.unwrap_or_else(|err| {
            error!(error = %err, "initial config rejected, injection disabled");
            RuleSet::disabled()
        });

        let settings = rules.settings();
        let perf = &settings.performance;
        let metrics = Arc::new(Metrics::new());
        let executor = RegexExecutor::new(perf.regex_workers, perf.max_pending_regex)?;
        let breaker = CircuitBreaker::new(
            settings.circuit_breaker.failure_threshold,
            settings.circuit_breaker.cooldown(),
        );
        let cache = ContentCache::new(
            perf.cache_ttl(),
            perf.max_cache_size_bytes,
            Arc::clone(&metrics),
        );

        info!(
            rules = rules.len(),
            enabled = settings.enabled,
            "context injector ready"
        );

        Ok(Injector {
            rules: RwLock::new(Arc::new(rules)),
            cache,
            breaker,
            executor: RwLock::new(Arc::new(executor)),
            metrics,
            reader: self.reader,
            source: self.source,
            validator: self.validator,
            reload_lock: Mutex::new(()),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Injector
// ═══════════════════════════════════════════════════════════════════════════════

/// Detects intent in prompts and attaches matching reference content.
pub struct Injector {
    rules: RwLock<Arc<RuleSet>>,
    cache: ContentCache,
    breaker: CircuitBreaker,
    executor: RwLock<Arc<RegexExecutor>>,
    metrics: Arc<Metrics>,
    reader: Box<dyn ContentReader>,
    source: Option<Box<dyn ConfigSource>>,
    validator: Box<dyn ConfigValidator>,
    /// Serializes reloads; readers never take it.
    reload_lock: Mutex<()>,
}

/// Context gathered for one request before it touches the payload.
struct Plan {
    matches: Vec<MatchResult>,
    blocks: Vec<String>,
    notifications: Vec<String>,
}

impl Injector {
    /// Shorthand for a builder with an initial config and no reload source.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] if the worker pool cannot be started.
    pub fn new(
        config: InjectorConfig,
        reader: impl ContentReader + 'static,
    ) -> Result<Self, ExecutorError> {
        InjectorBuilder::new(reader).config(config).build()
    }

    #[must_use]
    pub fn builder(reader: impl ContentReader + 'static) -> InjectorBuilder {
        InjectorBuilder::new(reader)
    }

    /// The active rule set. Holding the `Arc` pins this snapshot.
    #[must_use]
    pub fn rule_set(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read())
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Point-in-time metrics, including cache size and open breakers.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.cache.size_bytes(), self.breaker.open_rules())
    }

    /// The regex worker pool currently in use. Replaced when a reload
    /// changes its size.
    #[must_use]
    pub fn executor(&self) -> Arc<RegexExecutor> {
        Arc::clone(&self.executor.read())
    }

    /// Rules that fire for `text`, ranked by priority then confidence.
    ///
    /// Empty when injection is disabled for `caller`. Rules whose breaker is
    /// open are skipped. Equal-ranked matches keep rule-name order.
    pub fn detect(&self, text: &str, caller: &str) -> Vec<MatchResult> {
        let started = Instant::now();
        let rules = self.rule_set();

        let detected = panic::catch_unwind(AssertUnwindSafe(|| {
            self.detect_in(&rules, text, caller)
        }));
        let matches = match detected {
            Ok(matches) => matches,
            Err(panic) => {
                self.fail(caller, &InjectionError::Panicked(panic_message(panic.as_ref())));
                return Vec::new();
            }
        };

        let max = rules.settings().performance.max_injection();
        let elapsed = started.elapsed();
        if elapsed > max {
            warn!(
                caller,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = max.as_millis() as u64,
                "detection exceeded budget"
            );
        }
        matches
    }

    /// Detect, load referenced content and merge it into `payload`.
    ///
    /// Never fails: on any error the original payload comes back with no
    /// notifications. In dry-run mode the payload is always returned as-is
    /// and the notifications describe what would have happened.
    pub fn inject<P: Payload>(&self, text: &str, caller: &str, mut payload: P) -> Injection<P> {
        let started = Instant::now();
        let rules = self.rule_set();
        let flags = &rules.settings().feature_flags;

        let planned = panic::catch_unwind(AssertUnwindSafe(|| self.plan(&rules, text, caller)));
        let plan = match planned {
            Ok(plan) => plan,
            Err(panic) => {
                self.fail(caller, &InjectionError::Panicked(panic_message(panic.as_ref())));
                return Injection::unchanged(payload);
            }
        };
        if plan.matches.is_empty() {
            return Injection::unchanged(payload);
        }

        if flags.dry_run_mode {
            let notifications = dry_run_notifications(plan.notifications);
            info!(
                caller,
                matches = plan.matches.len(),
                "dry run, payload left unmodified"
            );
            return Injection {
                payload,
                notifications,
                injected: false,
            };
        }

        if plan.blocks.is_empty() {
            debug!(caller, "no reference content available, nothing injected");
            return Injection::unchanged(payload);
        }

        let merged = match payload.primary_text() {
            Some(original) => format!("{}\n\n{original}", plan.blocks.join("\n\n")),
            None => {
                self.fail(caller, &InjectionError::NoTextField);
                return Injection::unchanged(payload);
            }
        };
        if !payload.set_primary_text(merged) {
            self.fail(caller, &InjectionError::NoTextField);
            return Injection::unchanged(payload);
        }

        self.metrics.record_injection();
        let elapsed = started.elapsed();
        let max = rules.settings().performance.max_injection();
        if elapsed > max {
            warn!(
                caller,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = max.as_millis() as u64,
                "injection exceeded budget"
            );
        }
        info!(
            caller,
            references = plan.blocks.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "context injected"
        );

        Injection {
            payload,
            notifications: if flags.notify {
                plan.notifications
            } else {
                Vec::new()
            },
            injected: true,
        }
    }

    fn detect_in(&self, rules: &RuleSet, text: &str, caller: &str) -> Vec<MatchResult> {
        if !rules.is_enabled_for(caller) {
            debug!(caller, "injection disabled for caller");
            return Vec::new();
        }
        self.metrics.record_detection();

        let settings = rules.settings();
        let executor = self.executor();
        let scorer = Scorer::new(
            &executor,
            &self.breaker,
            &self.metrics,
            settings.weights,
            settings.performance.pattern_match_timeout(),
        );
        let input = ScoringInput::new(text);

        let mut matches: Vec<MatchResult> = rules
            .rules()
            .iter()
            .filter(|rule| {
                let open = self.breaker.is_open(rule.name());
                if open {
                    debug!(rule = rule.name(), "breaker open, rule skipped");
                }
                !open
            })
            .filter_map(|rule| scorer.score(&input, rule))
            .collect();

        // Stable sort: ties keep the set's name order.
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });

        for m in &matches {
            self.metrics.record_fire(&m.rule_name);
        }
        debug!(caller, matches = matches.len(), "detection finished");
        matches
    }

    fn plan(&self, rules: &RuleSet, text: &str, caller: &str) -> Plan {
        let matches = self.detect_in(rules, text, caller);
        let flags = &rules.settings().feature_flags;

        // Dry runs never read content.
        if flags.dry_run_mode || matches.is_empty() {
            let notifications = matches
                .iter()
                .filter(|m| !m.notification_text.is_empty())
                .map(|m| m.notification_text.clone())
                .collect();
            return Plan {
                matches,
                blocks: Vec::new(),
                notifications,
            };
        }

        let mut seen = HashSet::new();
        let mut loaded = HashSet::new();
        let mut blocks = Vec::new();
        for id in matches.iter().flat_map(|m| &m.context_references) {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.load(id, flags.caching_enabled) {
                Ok(content) => {
                    blocks.push(context_block(id, &content));
                    loaded.insert(id.as_str());
                }
                Err(err) => warn!(reference = %id, error = %err, "skipping unavailable reference"),
            }
        }

        // Only rules that got at least one block attached say so.
        let notifications = matches
            .iter()
            .filter(|m| !m.notification_text.is_empty())
            .filter(|m| {
                m.context_references
                    .iter()
                    .any(|id| loaded.contains(id.as_str()))
            })
            .map(|m| m.notification_text.clone())
            .collect();

        Plan {
            matches,
            blocks,
            notifications,
        }
    }

    fn load(&self, id: &str, caching: bool) -> Result<Arc<str>, ContentLoadError> {
        if caching {
            self.cache.get_or_load(id, self.reader.as_ref())
        } else {
            self.reader.read(id).map(Arc::from)
        }
    }

    fn fail(&self, caller: &str, err: &InjectionError) {
        self.metrics.record_failure();
        error!(caller, error = %err, "injection failed, payload passed through");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reload
    // ═══════════════════════════════════════════════════════════════════════════

    /// Re-read the config source and atomically swap in the new rule set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoSource`] if the injector was built without a
    /// source, or whatever loading, validation or compilation reported. The
    /// previously active rule set stays in place on error.
    pub fn reload(&self) -> Result<ReloadReport, ConfigError> {
        let _guard = self.reload_lock.lock();
        let result = self.read_source().and_then(|config| self.install(&config));
        self.finish_reload(result)
    }

    /// Compile `config` and swap it in, as [`reload`](Self::reload) does.
    ///
    /// # Errors
    ///
    /// Returns the compilation error; the active rule set is kept.
    pub fn apply_config(&self, config: &InjectorConfig) -> Result<ReloadReport, ConfigError> {
        let _guard = self.reload_lock.lock();
        let result = self.install(config);
        self.finish_reload(result)
    }

    fn read_source(&self) -> Result<InjectorConfig, ConfigError> {
        let source = self.source.as_ref().ok_or(ConfigError::NoSource)?;
        InjectorConfig::from_value(source.load()?, self.validator.as_ref())
    }

    fn install(&self, config: &InjectorConfig) -> Result<ReloadReport, ConfigError> {
        let next = compile(config)?;
        let settings = next.settings();
        let perf = &settings.performance;

        self.breaker.reconfigure(
            settings.circuit_breaker.failure_threshold,
            settings.circuit_breaker.cooldown(),
        );
        self.cache
            .reconfigure(perf.cache_ttl(), perf.max_cache_size_bytes);
        if !settings.feature_flags.caching_enabled {
            self.cache.invalidate_all();
        }
        self.resize_executor(perf.regex_workers, perf.max_pending_regex);

        let rules = next.len();
        let previous = std::mem::replace(&mut *self.rules.write(), Arc::new(next));
        Ok(ReloadReport {
            rules,
            previous_rules: previous.len(),
        })
    }

    fn resize_executor(&self, workers: usize, max_pending: usize) {
        let current = self.executor();
        if current.workers() == workers && current.max_pending() == max_pending {
            return;
        }
        match RegexExecutor::new(workers, max_pending) {
            Ok(executor) => {
                *self.executor.write() = Arc::new(executor);
                info!(workers, max_pending, "regex worker pool resized");
            }
            Err(err) => warn!(error = %err, "could not resize regex worker pool, keeping current"),
        }
    }

    fn finish_reload(
        &self,
        result: Result<ReloadReport, ConfigError>,
    ) -> Result<ReloadReport, ConfigError> {
        match &result {
            Ok(report) => {
                self.metrics.record_reload();
                info!(
                    rules = report.rules,
                    previous_rules = report.previous_rules,
                    "config reloaded"
                );
            }
            Err(err) => {
                self.metrics.record_reload_failure();
                warn!(error = %err, "config reload rejected, keeping previous rules");
            }
        }
        result
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("rules", &*self.rule_set())
            .field("cache_entries", &self.cache.len())
            .field("breaker", &self.breaker)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

/// Delimited block for one reference.
fn context_block(id: &str, content: &str) -> String {
    format!("<context source=\"{id}\">\n{content}\n</context>")
}

fn dry_run_notifications(mut notifications: Vec<String>) -> Vec<String> {
    match notifications.first_mut() {
        Some(first) => *first = format!("{DRY_RUN_MARKER} {first}"),
        None => notifications.push(format!("{DRY_RUN_MARKER} no context would be injected")),
    }
    notifications
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(raw: serde_json::Value) -> InjectorConfig {
        InjectorConfig::from_value(raw, &SchemaValidator).unwrap()
    }

    fn docs() -> impl Fn(&str) -> Result<String, ContentLoadError> + Send + Sync {
        let mut map = HashMap::new();
        map.insert("docs/deploy.md", "Run ./deploy.sh");
        map.insert("docs/rollback.md", "Run ./rollback.sh");
        move |id: &str| {
            map.get(id)
                .map(|s| (*s).to_string())
                .ok_or_else(|| ContentLoadError::NotFound { id: id.into() })
        }
    }

    fn ops_config() -> InjectorConfig {
        config(json!({
            "enabled": true,
            "rules": {
                "ops": {
                    "priority": 50,
                    "triggers": { "keywords": ["deploy", "rollback"] },
                    "confidence_threshold": 0.2,
                    "context_references": ["docs/deploy.md", "docs/missing.md", "docs/rollback.md"],
                    "notification_text": "Attached deployment runbooks"
                }
            }
        }))
    }

    #[test]
    fn injects_blocks_in_reference_order() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        let out = injector.inject("plan the deploy", "cli", "plan the deploy".to_string());

        assert!(out.injected);
        assert_eq!(
            out.payload,
            "<context source=\"docs/deploy.md\">\nRun ./deploy.sh\n</context>\n\n\
             <context source=\"docs/rollback.md\">\nRun ./rollback.sh\n</context>\n\n\
             plan the deploy"
        );
        assert_eq!(out.notifications, vec!["Attached deployment runbooks".to_string()]);
    }

    #[test]
    fn no_match_returns_payload_untouched() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        let out = injector.inject("hello", "cli", "hello".to_string());
        assert_eq!(out, Injection::unchanged("hello".to_string()));
    }

    #[test]
    fn references_are_deduplicated_across_matches() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let reader = move |id: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ContentLoadError>(format!("content of {id}"))
        };
        let cfg = config(json!({
            "enabled": true,
            "feature_flags": { "caching_enabled": false },
            "rules": {
                "a": { "triggers": { "keywords": ["x"] }, "confidence_threshold": 0.1,
                       "context_references": ["shared", "a-only"] },
                "b": { "triggers": { "keywords": ["x"] }, "confidence_threshold": 0.1,
                       "context_references": ["shared"] }
            }
        }));
        let injector = Injector::new(cfg, reader).unwrap();
        let out = injector.inject("x", "cli", "x".to_string());

        assert!(out.injected);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(out.payload.matches("<context source=\"shared\">").count(), 1);
        assert!(injector.cache().is_empty());
    }

    #[test]
    fn notify_off_suppresses_notifications() {
        let mut cfg = ops_config();
        cfg.feature_flags.notify = false;
        let injector = Injector::new(cfg, docs()).unwrap();
        let out = injector.inject("deploy", "cli", "deploy".to_string());
        assert!(out.injected);
        assert!(out.notifications.is_empty());
    }

    #[test]
    fn dry_run_without_notification_text_still_reports() {
        let cfg = config(json!({
            "enabled": true,
            "feature_flags": { "dry_run_mode": true },
            "rules": {
                "quiet": { "triggers": { "keywords": ["deploy"] }, "confidence_threshold": 0.1,
                           "context_references": ["docs/deploy.md"] }
            }
        }));
        let injector = Injector::new(cfg, docs()).unwrap();
        let out = injector.inject("deploy", "cli", "deploy".to_string());
        assert_eq!(out.payload, "deploy");
        assert_eq!(
            out.notifications,
            vec![format!("{DRY_RUN_MARKER} no context would be injected")]
        );
    }

    #[test]
    fn all_references_missing_means_no_injection() {
        let cfg = config(json!({
            "enabled": true,
            "rules": {
                "r": { "triggers": { "keywords": ["deploy"] }, "confidence_threshold": 0.1,
                       "context_references": ["nope"], "notification_text": "Attached" }
            }
        }));
        let injector = Injector::new(cfg, docs()).unwrap();
        let out = injector.inject("deploy", "cli", "deploy".to_string());
        assert!(!out.injected);
        assert!(out.notifications.is_empty());
    }

    #[test]
    fn rule_with_nothing_attached_does_not_notify() {
        let cfg = config(json!({
            "enabled": true,
            "rules": {
                "ghost": { "priority": 9, "triggers": { "keywords": ["deploy"] },
                           "confidence_threshold": 0.1,
                           "context_references": ["nope"], "notification_text": "Attached ghost notes" },
                "ops": { "triggers": { "keywords": ["deploy"] }, "confidence_threshold": 0.1,
                         "context_references": ["docs/deploy.md"], "notification_text": "Attached runbook" }
            }
        }));
        let injector = Injector::new(cfg, docs()).unwrap();
        let out = injector.inject("deploy", "cli", "deploy".to_string());

        assert!(out.injected);
        assert_eq!(out.notifications, vec!["Attached runbook".to_string()]);
    }

    #[test]
    fn payload_without_text_field_counts_as_failure() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        let payload = json!({ "model": "m" });
        let out = injector.inject("deploy", "cli", payload.clone());
        assert!(!out.injected);
        assert_eq!(out.payload, payload);
        assert_eq!(injector.metrics().failures, 1);
    }

    #[test]
    fn panicking_reader_is_contained() {
        let reader = |_: &str| -> Result<String, ContentLoadError> { panic!("reader exploded") };
        let injector = Injector::new(ops_config(), reader).unwrap();
        let out = injector.inject("deploy", "cli", "deploy".to_string());

        assert_eq!(out, Injection::unchanged("deploy".to_string()));
        assert_eq!(injector.metrics().failures, 1);
    }

    #[test]
    fn invalid_initial_config_falls_back_to_disabled() {
        let cfg = config(json!({
            "enabled": true,
            "rules": { "bad": { "triggers": { "regex_patterns": ["("] } } }
        }));
        let injector = Injector::new(cfg, docs()).unwrap();
        assert!(injector.rule_set().is_empty());
        assert!(!injector.rule_set().settings().enabled);
    }

    #[test]
    fn reload_without_source_is_rejected() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        assert!(matches!(injector.reload(), Err(ConfigError::NoSource)));
        assert_eq!(injector.metrics().reload_failures, 1);
        assert_eq!(injector.rule_set().len(), 1);
    }

    #[test]
    fn apply_config_swaps_and_resizes() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        let mut next = ops_config();
        next.performance.regex_workers = 1;
        next.rules.clear();

        let report = injector.apply_config(&next).unwrap();
        assert_eq!(report, ReloadReport { rules: 0, previous_rules: 1 });
        assert_eq!(injector.executor().workers(), 1);
        assert_eq!(injector.metrics().reloads, 1);
    }

    #[test]
    fn disabling_cache_on_reload_empties_it() {
        let injector = Injector::new(ops_config(), docs()).unwrap();
        injector.inject("deploy", "cli", "deploy".to_string());
        assert!(!injector.cache().is_empty());

        let mut next = ops_config();
        next.feature_flags.caching_enabled = false;
        injector.apply_config(&next).unwrap();
        assert!(injector.cache().is_empty());
        assert_eq!(injector.metrics().cache_size_bytes, 0);
    }

    #[test]
    fn dry_run_marker_prefixes_only_the_first_notice() {
        let notices = dry_run_notifications(vec!["one".into(), "two".into()]);
        assert_eq!(notices, vec![format!("{DRY_RUN_MARKER} one"), "two".to_string()]);
    }
}
