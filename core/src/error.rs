//! Error taxonomy for the engine.
//!
//! None of these ever reach the caller of [`Injector::inject`](crate::Injector::inject):
//! configuration errors end a reload attempt, content errors skip one
//! reference, and everything else is absorbed at the injector boundary.

use std::path::PathBuf;

/// Errors that reject a configuration (initial load or reload).
///
/// The previously active [`RuleSet`](crate::RuleSet) stays in place when a
/// reload fails with any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The raw document failed schema validation.
    #[error("config schema invalid: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// The document passed schema validation but could not be deserialized.
    #[error("config shape invalid: {0}")]
    Shape(#[from] serde_json::Error),

    /// Reading the config file failed.
    #[error("failed to read config \"{}\": {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("failed to parse JSON config \"{}\": {source}", path.display())]
    Json {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The config file is not valid YAML.
    #[error("failed to parse YAML config \"{}\": {source}", path.display())]
    Yaml {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A rule is structurally invalid (threshold out of range, oversized keyword, ...).
    #[error("invalid rule \"{rule}\": {reason}")]
    InvalidRule {
        /// Name of the offending rule.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Global settings are out of range.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting {
        /// Dotted path of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A regex source failed to compile. One bad pattern rejects the whole config.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The filesystem watcher could not be started.
    #[error("config watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A reload was requested but the injector has no config source.
    #[error("no config source to reload from")]
    NoSource,
}

/// A single regex source that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule \"{rule}\": invalid regex \"{pattern}\": {reason}")]
pub struct CompileError {
    /// Rule the pattern belongs to.
    pub rule: String,
    /// The pattern source as written in the config.
    pub pattern: String,
    /// The regex engine's message.
    pub reason: String,
}

/// The content reader could not supply a reference.
///
/// Only that reference is skipped; the rest of the injection proceeds.
#[derive(Debug, thiserror::Error)]
pub enum ContentLoadError {
    /// No content exists for the identifier.
    #[error("content \"{id}\" not found")]
    NotFound {
        /// The requested identifier.
        id: String,
    },

    /// The identifier is not acceptable to the reader (e.g. escapes its root).
    #[error("content identifier \"{id}\" rejected: {reason}")]
    InvalidIdentifier {
        /// The requested identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reading the content failed.
    #[error("failed to read content \"{id}\": {source}")]
    Io {
        /// The requested identifier.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other reader-specific failure.
    #[error("content \"{id}\" unavailable: {reason}")]
    Unavailable {
        /// The requested identifier.
        id: String,
        /// Reader-supplied description.
        reason: String,
    },
}

/// A failure caught at the injector boundary.
///
/// Logged and counted, never returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// Detection or loading panicked.
    #[error("injection aborted by panic: {0}")]
    Panicked(String),

    /// Context was produced but the payload exposes no text field to merge it into.
    #[error("payload has no mergeable text field")]
    NoTextField,
}
