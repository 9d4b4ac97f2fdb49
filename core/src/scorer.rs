//! Confidence scorer: keyword, combination and regex evidence -> one score.
//!
//! Each channel contributes `weight × (hits / configured)`. Channels a rule
//! does not configure contribute zero, and the sum is not renormalized: a
//! keyword-only rule tops out at the keyword weight. Richer evidence
//! requirements demand richer corroboration.

use crate::config::Weights;
use crate::executor::RegexOutcome;
use crate::{CircuitBreaker, CompiledRule, Metrics, RegexExecutor};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Slack for floating point when comparing against a threshold, so that
/// `0.4 × 0.5` fires at a threshold of `0.2`.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// A rule that fired for one input. Created per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub rule_name: String,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub matched_combinations: Vec<Vec<String>>,
    pub matched_regex_sources: Vec<String>,
    pub context_references: Vec<String>,
    pub notification_text: String,
    pub priority: i64,
}

/// Input text prepared once per request and shared by every rule.
#[derive(Debug, Clone)]
pub struct ScoringInput {
    text: Arc<str>,
    lowered: String,
}

impl ScoringInput {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            text: Arc::from(text),
            lowered: text.to_lowercase(),
        }
    }
}

/// Regex channel outcome for one rule.
#[derive(Debug, Default)]
struct RegexEvidence {
    matched: Vec<String>,
    /// A pattern timed out or the rule's budget ran out.
    slow: bool,
    /// A pattern never got a worker in time. Not the rule's fault.
    starved: bool,
}

/// Scores rules against input using shared engine components.
pub struct Scorer<'a> {
    executor: &'a RegexExecutor,
    breaker: &'a CircuitBreaker,
    metrics: &'a Metrics,
    weights: Weights,
    rule_budget: Duration,
}

impl<'a> Scorer<'a> {
    /// `rule_budget` is the total regex time one rule may spend per request.
    #[must_use]
    pub fn new(
        executor: &'a RegexExecutor,
        breaker: &'a CircuitBreaker,
        metrics: &'a Metrics,
        weights: Weights,
        rule_budget: Duration,
    ) -> Self {
        Self {
            executor,
            breaker,
            metrics,
            weights,
            rule_budget,
        }
    }

    /// Score `rule` against `input`; `Some` only if the rule fires.
    ///
    /// Regex matching is skipped while the rule's breaker is open. Slowness
    /// is reported to the breaker, and the score uses whatever evidence
    /// completed in time.
    pub fn score(&self, input: &ScoringInput, rule: &CompiledRule) -> Option<MatchResult> {
        let matched_keywords: Vec<String> = rule
            .keywords
            .iter()
            .filter(|k| k.found_in(&input.lowered))
            .map(|k| k.text.clone())
            .collect();

        let matched_combinations: Vec<Vec<String>> = rule
            .combinations
            .iter()
            .filter(|group| group.iter().all(|k| k.found_in(&input.lowered)))
            .map(|group| group.iter().map(|k| k.text.clone()).collect())
            .collect();

        let regex = if rule.patterns.is_empty() {
            RegexEvidence::default()
        } else if self.breaker.is_open(rule.name()) {
            debug!(rule = rule.name(), "breaker open, skipping regex evidence");
            RegexEvidence::default()
        } else {
            let evidence = self.regex_evidence(input, rule);
            if evidence.slow {
                self.breaker.record_failure(rule.name());
            } else if !evidence.starved {
                self.breaker.record_success(rule.name());
            }
            evidence
        };

        let confidence = self.weights.keywords
            * fraction(matched_keywords.len(), rule.keywords.len())
            + self.weights.combinations
                * fraction(matched_combinations.len(), rule.combinations.len())
            + self.weights.regex * fraction(regex.matched.len(), rule.patterns.len());

        debug!(
            rule = rule.name(),
            confidence,
            threshold = rule.confidence_threshold(),
            "scored rule"
        );

        if confidence + THRESHOLD_EPSILON < rule.confidence_threshold() {
            return None;
        }

        Some(MatchResult {
            rule_name: rule.name().to_string(),
            confidence,
            matched_keywords,
            matched_combinations,
            matched_regex_sources: regex.matched,
            context_references: rule.context_references().to_vec(),
            notification_text: rule.notification_text().to_string(),
            priority: rule.priority(),
        })
    }

    fn regex_evidence(&self, input: &ScoringInput, rule: &CompiledRule) -> RegexEvidence {
        let started = Instant::now();
        let mut evidence = RegexEvidence::default();

        for pattern in &rule.patterns {
            if started.elapsed() >= self.rule_budget {
                evidence.slow |= !evidence.starved;
                break;
            }
            let outcome = self
                .executor
                .run(&pattern.regex, &input.text, rule.pattern_budget());
            match outcome {
                RegexOutcome::Matched => evidence.matched.push(pattern.source.clone()),
                RegexOutcome::NoMatch => {}
                RegexOutcome::Starved => {
                    self.metrics.record_timeout();
                    debug!(
                        rule = rule.name(),
                        pattern = %pattern.source,
                        "regex match queued past its deadline"
                    );
                    evidence.starved = true;
                }
                RegexOutcome::TimedOut | RegexOutcome::Rejected | RegexOutcome::Failed => {
                    self.metrics.record_timeout();
                    warn!(
                        rule = rule.name(),
                        pattern = %pattern.source,
                        ?outcome,
                        budget_ms = rule.pattern_budget().as_millis() as u64,
                        "regex match did not complete in time"
                    );
                    evidence.slow = true;
                }
            }
        }

        if started.elapsed() > self.rule_budget && !evidence.starved {
            evidence.slow = true;
        }
        evidence
    }
}

fn fraction(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
