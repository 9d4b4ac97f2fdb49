//! Where raw configuration documents come from.
//!
//! A [`ConfigSource`] yields an untyped document; validation and compilation
//! happen in the injector so that every source gets identical checks.

use crate::ConfigError;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Supplies the raw configuration document on each (re)load.
pub trait ConfigSource: Send + Sync {
    /// Read the current document.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] that prevents producing a document.
    fn load(&self) -> Result<Value, ConfigError>;
}

/// A config file on disk. `.json` files parse as JSON, anything else as YAML.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<Value, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        if self.is_json() {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: self.path.clone(),
                source,
            })
        } else {
            // .yaml, .yml and anything unrecognized
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: self.path.clone(),
                source,
            })
        }
    }
}

/// An in-memory document that can be swapped at runtime.
#[derive(Debug)]
pub struct StaticConfigSource {
    value: RwLock<Value>,
}

impl StaticConfigSource {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Replace the document returned by the next [`load`](ConfigSource::load).
    pub fn replace(&self, value: Value) {
        *self.value.write() = value;
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Value, ConfigError> {
        Ok(self.value.read().clone())
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for std::sync::Arc<S> {
    fn load(&self) -> Result<Value, ConfigError> {
        (**self).load()
    }
}
