//! Rule compiler: [`InjectorConfig`] -> [`RuleSet`].
//!
//! Compilation is all-or-nothing. A single invalid regex anywhere in the
//! config rejects the whole config, so a partially valid rule set is never
//! served. Swapping the result into place is the injector's job.

use crate::config::{
    CircuitBreakerConfig, FeatureFlags, InjectorConfig, PerformanceConfig, RuleDefinition, Weights,
};
use crate::executor::per_pattern_budget;
use crate::{CompileError, ConfigError, MAX_PATTERN_LENGTH, MAX_REGEX_PATTERN_LENGTH};
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::time::Duration;

/// A keyword with its pre-lowercased form.
#[derive(Debug, Clone)]
pub(crate) struct Keyword {
    pub(crate) text: String,
    pub(crate) lowered: String,
}

impl Keyword {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            lowered: text.to_lowercase(),
        }
    }

    /// `haystack` must already be lowercased.
    pub(crate) fn found_in(&self, haystack: &str) -> bool {
        haystack.contains(self.lowered.as_str())
    }
}

/// A compiled regex together with the source it came from.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub(crate) source: String,
    pub(crate) regex: Regex,
}

/// A rule with all matchers pre-built. Owned by its [`RuleSet`].
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    priority: i64,
    pub(crate) keywords: Vec<Keyword>,
    pub(crate) combinations: Vec<Vec<Keyword>>,
    pub(crate) patterns: Vec<CompiledPattern>,
    pattern_budget: Duration,
    confidence_threshold: f64,
    context_references: Vec<String>,
    notification_text: String,
}

impl CompiledRule {
    /// Compile one rule definition.
    ///
    /// `perf` decides how the rule's regex budget is split per pattern.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidRule`] for structural problems,
    /// [`ConfigError::Compile`] for a regex that does not compile.
    pub fn compile(
        name: &str,
        def: &RuleDefinition,
        perf: &PerformanceConfig,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRule {
            rule: name.to_string(),
            reason,
        };

        let threshold = def.confidence_threshold;
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(invalid(format!(
                "confidence_threshold must be in [0, 1), got {threshold}"
            )));
        }

        let keywords = def
            .triggers
            .keywords
            .iter()
            .map(|kw| compile_keyword(kw).map_err(&invalid))
            .collect::<Result<Vec<_>, _>>()?;

        let combinations = def
            .triggers
            .keyword_combinations
            .iter()
            .map(|group| {
                if group.is_empty() {
                    return Err(invalid("keyword combination groups must not be empty".into()));
                }
                group
                    .iter()
                    .map(|kw| compile_keyword(kw).map_err(&invalid))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let patterns = def
            .triggers
            .regex_patterns
            .iter()
            .map(|source| compile_pattern(name, source))
            .collect::<Result<Vec<_>, _>>()?;

        if def.context_references.iter().any(|r| r.trim().is_empty()) {
            return Err(invalid("context references must not be empty".into()));
        }

        let pattern_budget = per_pattern_budget(
            perf.pattern_match_timeout(),
            patterns.len(),
            perf.min_regex_timeout(),
        );

        Ok(Self {
            name: name.to_string(),
            priority: def.priority,
            keywords,
            combinations,
            patterns,
            pattern_budget,
            confidence_threshold: threshold,
            context_references: def.context_references.clone(),
            notification_text: def.notification_text.clone(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    #[must_use]
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    #[must_use]
    pub fn context_references(&self) -> &[String] {
        &self.context_references
    }

    #[must_use]
    pub fn notification_text(&self) -> &str {
        &self.notification_text
    }

    /// Number of regex sources in this rule.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Deadline for each single regex match of this rule.
    #[must_use]
    pub fn pattern_budget(&self) -> Duration {
        self.pattern_budget
    }

    /// Keywords as written in the config.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.text.as_str())
    }
}

fn compile_keyword(text: &str) -> Result<Keyword, String> {
    if text.is_empty() {
        return Err("keywords must not be empty".into());
    }
    if text.len() > MAX_PATTERN_LENGTH {
        return Err(format!(
            "keyword length is {}, but maximum allowed is {MAX_PATTERN_LENGTH}",
            text.len()
        ));
    }
    Ok(Keyword::new(text))
}

fn compile_pattern(rule: &str, source: &str) -> Result<CompiledPattern, ConfigError> {
    let error = |reason: String| {
        ConfigError::Compile(CompileError {
            rule: rule.to_string(),
            pattern: source.to_string(),
            reason,
        })
    };

    if source.len() > MAX_REGEX_PATTERN_LENGTH {
        return Err(error(format!(
            "pattern length is {}, but maximum allowed is {MAX_REGEX_PATTERN_LENGTH}",
            source.len()
        )));
    }

    let regex = RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| error(e.to_string()))?;

    Ok(CompiledPattern {
        source: source.to_string(),
        regex,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// RuleSet
// ═══════════════════════════════════════════════════════════════════════════════

/// Global settings carried alongside the rules of a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub enabled: bool,
    pub feature_flags: FeatureFlags,
    pub performance: PerformanceConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub weights: Weights,
}

/// One immutable snapshot of compiled rules plus settings.
///
/// The injector holds the active set behind an `Arc` and replaces it
/// wholesale on reload; readers never see a half-built set.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    settings: Settings,
}

impl RuleSet {
    /// The safe default: injection off, no rules.
    #[must_use]
    pub fn disabled() -> Self {
        let config = InjectorConfig::disabled();
        Self {
            rules: Vec::new(),
            settings: settings_of(&config),
        }
    }

    /// Rules in stable (name-ascending) order.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.rules[i])
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether injection runs for `caller`.
    ///
    /// Every switch must be on: the top-level `enabled`, `global_enabled`,
    /// and the caller's override if one is configured.
    #[must_use]
    pub fn is_enabled_for(&self, caller: &str) -> bool {
        let flags = &self.settings.feature_flags;
        self.settings.enabled
            && flags.global_enabled
            && flags
                .per_caller_override
                .get(caller)
                .copied()
                .unwrap_or(true)
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules.len())
            .field("enabled", &self.settings.enabled)
            .finish()
    }
}

fn settings_of(config: &InjectorConfig) -> Settings {
    Settings {
        enabled: config.enabled,
        feature_flags: config.feature_flags.clone(),
        performance: config.performance.clone(),
        circuit_breaker: config.circuit_breaker.clone(),
        weights: config.scoring.weights,
    }
}

/// Compile a whole config into a [`RuleSet`].
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered; nothing is partially applied.
pub fn compile(config: &InjectorConfig) -> Result<RuleSet, ConfigError> {
    config.check_settings()?;

    // BTreeMap iteration is name-ascending, which `RuleSet::rule` relies on.
    let rules = config
        .rules
        .iter()
        .map(|(name, def)| CompiledRule::compile(name, def, &config.performance))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RuleSet {
        rules,
        settings: settings_of(config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaValidator;
    use serde_json::json;

    fn config(rules: serde_json::Value) -> InjectorConfig {
        InjectorConfig::from_value(json!({ "enabled": true, "rules": rules }), &SchemaValidator)
            .unwrap()
    }

    #[test]
    fn compiles_all_channels() {
        let set = compile(&config(json!({
            "ops": {
                "priority": 50,
                "triggers": {
                    "keywords": ["Deploy", "rollback"],
                    "keyword_combinations": [["deploy", "prod"]],
                    "regex_patterns": [r"v\d+\.\d+"]
                },
                "confidence_threshold": 0.2,
                "context_references": ["runbook.md"]
            }
        })))
        .unwrap();

        let ops = set.rule("ops").unwrap();
        assert_eq!(ops.priority(), 50);
        assert_eq!(ops.keywords().collect::<Vec<_>>(), vec!["Deploy", "rollback"]);
        assert_eq!(ops.keywords[0].lowered, "deploy");
        assert_eq!(ops.pattern_count(), 1);
        assert_eq!(ops.context_references(), ["runbook.md"]);
        assert_eq!(ops.pattern_budget(), Duration::from_millis(50));
    }

    #[test]
    fn pattern_budget_is_split_with_floor() {
        let mut cfg = config(json!({
            "few": { "triggers": { "regex_patterns": ["a", "b"] } },
            "many": { "triggers": { "regex_patterns": ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"] } }
        }));
        cfg.performance.pattern_match_timeout_ms = 40;
        cfg.performance.min_regex_timeout_ms = 5;
        let set = compile(&cfg).unwrap();

        assert_eq!(set.rule("few").unwrap().pattern_budget(), Duration::from_millis(20));
        assert_eq!(set.rule("many").unwrap().pattern_budget(), Duration::from_millis(5));
    }

    #[test]
    fn one_bad_regex_rejects_everything() {
        let err = compile(&config(json!({
            "good": { "triggers": { "regex_patterns": ["^ok$"] } },
            "bad": { "triggers": { "regex_patterns": ["fine", "[unclosed"] } }
        })))
        .unwrap_err();

        match err {
            ConfigError::Compile(e) => {
                assert_eq!(e.rule, "bad");
                assert_eq!(e.pattern, "[unclosed");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn oversized_regex_is_rejected() {
        let long = "a".repeat(MAX_REGEX_PATTERN_LENGTH + 1);
        let err = compile(&config(json!({
            "r": { "triggers": { "regex_patterns": [long] } }
        })))
        .unwrap_err();
        assert!(err.to_string().contains("maximum allowed"));
    }

    #[test]
    fn threshold_must_be_below_one() {
        let err = compile(&config(json!({
            "r": { "confidence_threshold": 1.0 }
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));
    }

    #[test]
    fn empty_keyword_is_rejected() {
        let err = compile(&config(json!({
            "r": { "triggers": { "keywords": [""] } }
        })))
        .unwrap_err();
        assert!(err.to_string().contains("keywords must not be empty"));
    }

    #[test]
    fn empty_combination_group_is_rejected() {
        assert!(compile(&config(json!({
            "r": { "triggers": { "keyword_combinations": [[]] } }
        })))
        .is_err());
    }

    #[test]
    fn regex_is_case_insensitive() {
        let set = compile(&config(json!({
            "r": { "triggers": { "regex_patterns": ["kubectl apply"] } }
        })))
        .unwrap();
        let pattern = &set.rule("r").unwrap().patterns[0];
        assert!(pattern.regex.is_match("run KUBECTL APPLY now"));
    }

    #[test]
    fn rules_are_name_ordered() {
        let set = compile(&config(json!({ "zeta": {}, "alpha": {}, "mid": {} }))).unwrap();
        let names: Vec<_> = set.rules().iter().map(CompiledRule::name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert!(set.rule("mid").is_some());
        assert!(set.rule("missing").is_none());
    }

    #[test]
    fn any_switch_off_disables_the_caller() {
        let mut cfg = config(json!({}));
        cfg.feature_flags
            .per_caller_override
            .insert("vip".into(), true);
        cfg.feature_flags
            .per_caller_override
            .insert("muted".into(), false);
        let set = compile(&cfg).unwrap();
        assert!(set.is_enabled_for("vip"));
        assert!(set.is_enabled_for("anyone"));
        assert!(!set.is_enabled_for("muted"));

        cfg.feature_flags.global_enabled = false;
        let set = compile(&cfg).unwrap();
        assert!(!set.is_enabled_for("vip"));
        assert!(!set.is_enabled_for("anyone"));

        cfg.feature_flags.global_enabled = true;
        cfg.enabled = false;
        let set = compile(&cfg).unwrap();
        assert!(!set.is_enabled_for("vip"));
    }

    #[test]
    fn disabled_set_serves_nobody() {
        let set = RuleSet::disabled();
        assert!(set.is_empty());
        assert!(!set.is_enabled_for("anyone"));
    }
}
