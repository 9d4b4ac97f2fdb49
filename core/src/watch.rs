//! Hot reload on config file changes.

use crate::{ConfigError, Injector};
use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Calls [`Injector::reload`] whenever the watched config file changes.
///
/// The parent directory is watched rather than the file itself so that
/// editors that save via rename are picked up. Dropping the watcher stops it.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `path` on behalf of `injector`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Watch`] if the watcher cannot be started, or
    /// [`ConfigError::Io`] if `path` has no file name.
    pub fn spawn(path: impl Into<PathBuf>, injector: Arc<Injector>) -> Result<Self, ConfigError> {
        let path = path.into();
        let Some(file_name) = path.file_name().map(OsString::from) else {
            return Err(ConfigError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "config path has no file name",
                ),
                path,
            });
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_relevant(&event, &file_name) => {
                    debug!(kind = ?event.kind, "config file changed");
                    // Failures are logged and counted by the injector.
                    let _ = injector.reload();
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "config watcher error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(path = %path.display(), "watching config for changes");
        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn data_change_on_the_file_is_relevant() {
        let name = OsString::from("rules.yaml");
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/etc/ctxi/rules.yaml",
        );
        assert!(is_relevant(&e, &name));
    }

    #[test]
    fn other_files_are_ignored() {
        let name = OsString::from("rules.yaml");
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/etc/ctxi/other.yaml",
        );
        assert!(!is_relevant(&e, &name));
    }

    #[test]
    fn removal_is_ignored() {
        let name = OsString::from("rules.yaml");
        let e = event(EventKind::Remove(RemoveKind::File), "/etc/ctxi/rules.yaml");
        assert!(!is_relevant(&e, &name));
    }

    #[test]
    fn rename_into_place_is_relevant() {
        let name = OsString::from("rules.yaml");
        let e = event(
            EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::To)),
            "/etc/ctxi/rules.yaml",
        );
        assert!(is_relevant(&e, &name));
    }
}
