//! Filesystem content reader.

use ctxi::{ContentLoadError, ContentReader};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Resolves reference identifiers as relative paths under a base directory.
///
/// Identifiers that are absolute or climb out with `..` are rejected.
#[derive(Debug, Clone)]
pub struct FsContentReader {
    root: PathBuf,
}

impl FsContentReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &str) -> Result<PathBuf, ContentLoadError> {
        let relative = Path::new(id);
        let invalid = |reason: &str| ContentLoadError::InvalidIdentifier {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("empty identifier"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(invalid("`..` is not allowed")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("absolute paths are not allowed"))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

impl ContentReader for FsContentReader {
    fn read(&self, id: &str) -> Result<String, ContentLoadError> {
        let path = self.resolve(id)?;
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ContentLoadError::NotFound { id: id.to_string() },
            _ => ContentLoadError::Io {
                id: id.to_string(),
                source,
            },
        })
    }
}
