//! ctxi - prompt pattern detection and context injection
//!
//! Detects domain-specific intent in free-text prompts and decides, in
//! bounded time, which pieces of reference content to attach to a
//! downstream request.
//!
//! # Architecture
//!
//! - [`InjectorConfig`]: Authoring-time rules and settings (JSON or YAML)
//! - [`compile()`]: All-or-nothing compilation into an immutable [`RuleSet`]
//! - [`RegexExecutor`]: Regex matches on a worker pool under a deadline
//! - [`CircuitBreaker`]: Suspends regex matching for chronically slow rules
//! - [`Scorer`]: Weighted keyword / combination / regex evidence
//! - [`ContentCache`]: TTL + LRU cache bounded by total content size
//! - [`Injector`]: Ties it together per request and owns hot reload
//!
//! # Key Invariants
//!
//! 1. **One snapshot per request**: a `detect` or `inject` call sees exactly
//!    one [`RuleSet`], even if a reload lands mid-call.
//!
//! 2. **All-or-nothing reload**: one invalid regex rejects the whole config;
//!    the previously active set keeps serving.
//!
//! 3. **Best effort**: `inject` never fails the caller. Errors and panics
//!    leave the payload unchanged.
//!
//! # Example
//!
//! ```
//! use ctxi::prelude::*;
//! use serde_json::json;
//!
//! let config = InjectorConfig::from_value(
//!     json!({
//!         "enabled": true,
//!         "rules": {
//!             "ops": {
//!                 "priority": 50,
//!                 "triggers": { "keywords": ["deploy", "rollback"] },
//!                 "confidence_threshold": 0.2,
//!                 "context_references": ["deploy.md"],
//!                 "notification_text": "Attached deployment runbook"
//!             }
//!         }
//!     }),
//!     &SchemaValidator,
//! )
//! .unwrap();
//!
//! let reader = |id: &str| -> Result<String, ContentLoadError> { Ok(format!("contents of {id}")) };
//! let injector = Injector::new(config, reader).unwrap();
//!
//! let matches = injector.detect("plan the deploy", "cli");
//! assert_eq!(matches[0].rule_name, "ops");
//!
//! let out = injector.inject("plan the deploy", "cli", String::from("plan the deploy"));
//! assert!(out.injected);
//! assert!(out.payload.starts_with("<context source=\"deploy.md\">"));
//! assert_eq!(out.notifications, vec!["Attached deployment runbook".to_string()]);
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod breaker;
mod cache;
mod config;
mod error;
mod executor;
mod injector;
mod metrics;
mod payload;
mod rule;
mod scorer;
mod source;
mod watch;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Configuration
pub use config::{
    CircuitBreakerConfig, ConfigValidator, FeatureFlags, InjectorConfig, PerformanceConfig,
    RuleDefinition, SchemaValidator, ScoringConfig, Triggers, Weights,
};
pub use source::{ConfigSource, FileConfigSource, StaticConfigSource};
pub use watch::ConfigWatcher;

// Compilation
pub use rule::{compile, CompiledRule, RuleSet, Settings};

// Matching
pub use breaker::{BreakerState, CircuitBreaker};
pub use executor::{per_pattern_budget, ExecutorError, RegexExecutor, RegexOutcome};
pub use scorer::{MatchResult, Scorer, ScoringInput};

// Content
pub use cache::{CacheEntry, ContentCache, ContentReader};
pub use payload::Payload;

// Orchestration
pub use injector::{Injection, Injector, InjectorBuilder, ReloadReport};
pub use metrics::{Metrics, MetricsSnapshot};

// Errors
pub use error::{CompileError, ConfigError, ContentLoadError, InjectionError};

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum length of a single keyword.
pub const MAX_PATTERN_LENGTH: usize = 8192;

/// Maximum length of a regex source. Keeps compiled automata small.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4096;

/// Prefix of the first notification in dry-run mode.
pub const DRY_RUN_MARKER: &str = "[dry-run]";

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use ctxi::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Config
        ConfigSource,
        ConfigValidator,
        // Errors
        ConfigError,
        ContentLoadError,
        // Content
        ContentReader,
        FileConfigSource,
        // Orchestration
        Injection,
        Injector,
        InjectorConfig,
        MatchResult,
        MetricsSnapshot,
        Payload,
        ReloadReport,
        RuleDefinition,
        SchemaValidator,
    };
}
