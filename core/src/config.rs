//! Config types for rule-driven context injection.
//!
//! These types are the authoring-time view of the engine. They deserialize
//! from JSON or YAML and compile into a runtime [`RuleSet`](crate::RuleSet)
//! via [`compile()`](crate::compile).
//!
//! | Section | Type | Mandatory |
//! |---------|------|-----------|
//! | `enabled` | `bool` | yes |
//! | `rules` | map of [`RuleDefinition`] | yes |
//! | `feature_flags` | [`FeatureFlags`] | no |
//! | `performance` | [`PerformanceConfig`] | no |
//! | `circuit_breaker` | [`CircuitBreakerConfig`] | no |
//! | `scoring` | [`ScoringConfig`] | no |

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Top-level engine configuration.
///
/// Rules live in a `BTreeMap` so that iteration order (and with it the
/// tie-break order of equal-ranked matches) is stable across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectorConfig {
    /// Master switch. When `false` nothing is ever injected.
    pub enabled: bool,

    /// Runtime feature toggles.
    #[serde(default)]
    pub feature_flags: FeatureFlags,

    /// Timeouts, cache limits and pool sizes.
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Slow-rule breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Evidence channel weights.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Rules keyed by unique name.
    pub rules: BTreeMap<String, RuleDefinition>,
}

impl InjectorConfig {
    /// The safe fallback: everything off, no rules.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            feature_flags: FeatureFlags {
                global_enabled: false,
                ..FeatureFlags::default()
            },
            performance: PerformanceConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            scoring: ScoringConfig::default(),
            rules: BTreeMap::new(),
        }
    }

    /// Validate a raw document and deserialize it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] if the validator rejects the document,
    /// or [`ConfigError::Shape`] if a field has the wrong type.
    pub fn from_value(
        raw: serde_json::Value,
        validator: &dyn ConfigValidator,
    ) -> Result<Self, ConfigError> {
        validator.validate(&raw).map_err(ConfigError::Schema)?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Check global settings for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] naming the first bad field.
    pub fn check_settings(&self) -> Result<(), ConfigError> {
        let weights = &self.scoring.weights;
        for (field, value) in [
            ("scoring.weights.keywords", weights.keywords),
            ("scoring.weights.combinations", weights.combinations),
            ("scoring.weights.regex", weights.regex),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: format!("weight must be a finite non-negative number, got {value}"),
                });
            }
        }

        let perf = &self.performance;
        if perf.pattern_match_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "performance.pattern_match_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if perf.min_regex_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "performance.min_regex_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if perf.regex_workers == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "performance.regex_workers",
                reason: "at least one worker is required".into(),
            });
        }
        if perf.max_pending_regex == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "performance.max_pending_regex",
                reason: "must be greater than zero".into(),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "circuit_breaker.failure_threshold",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Runtime feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Injection for all callers.
    pub global_enabled: bool,
    /// Per-caller switch. `false` disables a caller; `true` is the same as
    /// having no entry.
    pub per_caller_override: HashMap<String, bool>,
    /// Return notification texts to the caller.
    pub notify: bool,
    /// Cache loaded reference content.
    pub caching_enabled: bool,
    /// Detect and notify, but never modify the payload.
    pub dry_run_mode: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            global_enabled: true,
            per_caller_override: HashMap::new(),
            notify: true,
            caching_enabled: true,
            dry_run_mode: false,
        }
    }
}

/// Timeouts, cache limits and pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Lifetime of a cached reference.
    pub cache_ttl_seconds: u64,
    /// Ceiling on the summed size of cached content.
    pub max_cache_size_bytes: usize,
    /// Regex budget for one rule on one request, split across its patterns.
    pub pattern_match_timeout_ms: u64,
    /// Advisory budget for a whole `inject` call. Overruns are logged.
    pub max_injection_ms: u64,
    /// Floor for a single pattern's share of the rule budget.
    pub min_regex_timeout_ms: u64,
    /// Threads in the regex worker pool.
    pub regex_workers: usize,
    /// Cap on submitted-but-unfinished regex jobs, including abandoned ones.
    pub max_pending_regex: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            max_cache_size_bytes: 10 * 1024 * 1024,
            pattern_match_timeout_ms: 50,
            max_injection_ms: 100,
            min_regex_timeout_ms: 5,
            regex_workers: 4,
            max_pending_regex: 64,
        }
    }
}

impl PerformanceConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    #[must_use]
    pub fn pattern_match_timeout(&self) -> Duration {
        Duration::from_millis(self.pattern_match_timeout_ms)
    }

    #[must_use]
    pub fn max_injection(&self) -> Duration {
        Duration::from_millis(self.max_injection_ms)
    }

    #[must_use]
    pub fn min_regex_timeout(&self) -> Duration {
        Duration::from_millis(self.min_regex_timeout_ms)
    }
}

/// Slow-rule breaker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open a rule's breaker.
    pub failure_threshold: u32,
    /// How long an open breaker stays open.
    pub timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            timeout_seconds: 60,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Evidence channel weights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: Weights,
}

/// Weight of each evidence channel in the final confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub keywords: f64,
    pub combinations: f64,
    pub regex: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            keywords: 0.4,
            combinations: 0.4,
            regex: 0.2,
        }
    }
}

/// One rule as written by its author.
///
/// # Example
///
/// ```
/// use ctxi::RuleDefinition;
///
/// let rule: RuleDefinition = serde_json::from_value(serde_json::json!({
///     "priority": 50,
///     "triggers": { "keywords": ["deploy", "rollback"] },
///     "confidence_threshold": 0.2,
///     "context_references": ["docs/deploy.md"],
///     "notification_text": "Attached deployment runbook"
/// }))
/// .unwrap();
/// assert_eq!(rule.triggers.keywords.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Higher wins when ranking matches.
    #[serde(default)]
    pub priority: i64,

    /// Evidence that makes this rule fire.
    #[serde(default)]
    pub triggers: Triggers,

    /// Minimum confidence in `[0, 1)` for the rule to fire.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,

    /// Content identifiers to inject, in order.
    #[serde(default)]
    pub context_references: Vec<String>,

    /// Caller-facing explanation shown when the rule fires.
    #[serde(default)]
    pub notification_text: String,

    /// Free-form author note. Not used at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_threshold() -> f64 {
    0.5
}

/// Evidence sources for one rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Triggers {
    /// Case-insensitive substrings.
    pub keywords: Vec<String>,
    /// AND-groups: every keyword of a group must be present.
    pub keyword_combinations: Vec<Vec<String>>,
    /// Regex sources (Rust `regex` syntax).
    pub regex_patterns: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Schema validation
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates a raw config document before deserialization.
///
/// Pluggable so embedders can bring a full JSON-Schema validator; the
/// built-in [`SchemaValidator`] only checks the shape the engine relies on.
pub trait ConfigValidator: Send + Sync {
    /// Return every problem found, or `Ok(())`.
    ///
    /// # Errors
    ///
    /// One message per schema violation.
    fn validate(&self, raw: &serde_json::Value) -> Result<(), Vec<String>>;
}

/// Minimal structural validator: mandatory `enabled` and `rules`,
/// and every optional section an object when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

const OPTIONAL_SECTIONS: [&str; 4] = ["feature_flags", "performance", "circuit_breaker", "scoring"];

impl ConfigValidator for SchemaValidator {
    fn validate(&self, raw: &serde_json::Value) -> Result<(), Vec<String>> {
        let Some(root) = raw.as_object() else {
            return Err(vec!["config root must be an object".into()]);
        };

        let mut errors = Vec::new();

        match root.get("enabled") {
            None => errors.push("missing mandatory field `enabled`".into()),
            Some(v) if !v.is_boolean() => errors.push("`enabled` must be a boolean".into()),
            Some(_) => {}
        }

        match root.get("rules") {
            None => errors.push("missing mandatory field `rules`".into()),
            Some(serde_json::Value::Object(rules)) => {
                for (name, rule) in rules {
                    if name.trim().is_empty() {
                        errors.push("rule names must not be empty".into());
                    }
                    if !rule.is_object() {
                        errors.push(format!("rule \"{name}\" must be an object"));
                    }
                }
            }
            Some(_) => errors.push("`rules` must be a mapping of name to rule".into()),
        }

        for section in OPTIONAL_SECTIONS {
            if let Some(v) = root.get(section) {
                if !v.is_object() {
                    errors.push(format!("`{section}` must be an object"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
