//! Config change watcher.
//!
//! Watches the config file for changes and emits reload triggers when it
//! is rewritten. Multiple rapid writes (editors love temp-file dances)
//! coalesce into a single event via debouncing. The trigger only tells the
//! caller *that* the file changed; reloading and re-applying the config is
//! the caller's business.

use crossbeam_channel::{Receiver, Sender, bounded};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Emitted when the watched config file changes.
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    /// Path of the file that changed
    pub path: PathBuf,
}

/// Handle to a running config watcher.
///
/// Dropping this handle stops the watcher.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    config_path: PathBuf,
}

impl ConfigWatcher {
    /// Watch `config_path` for modification, returning the watcher handle
    /// and a receiver of reload triggers.
    ///
    /// The parent directory is watched (non-recursively) rather than the
    /// file itself: editors that replace the file would otherwise detach
    /// the watch.
    pub fn new(config_path: &Path) -> Result<(Self, Receiver<ReloadEvent>), WatchError> {
        let dir = config_path
            .parent()
            .ok_or_else(|| WatchError::Init("config path has no parent directory".into()))?
            .to_path_buf();

        let (tx, rx) = bounded(16);
        let watched = config_path.to_path_buf();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| {
                Self::handle_debounced_events(result, &watched, &tx);
            },
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        debouncer
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        tracing::info!(target: "config::watcher", path = %config_path.display(), "watching config");

        Ok((
            Self {
                _debouncer: debouncer,
                config_path: config_path.to_path_buf(),
            },
            rx,
        ))
    }

    /// Path being watched.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn handle_debounced_events(
        result: DebounceEventResult,
        watched: &Path,
        tx: &Sender<ReloadEvent>,
    ) {
        match result {
            Ok(events) => {
                let touched = events
                    .iter()
                    .flat_map(|e| e.paths.iter())
                    .any(|p| p == watched);
                if touched {
                    tracing::debug!(target: "config::watcher", path = %watched.display(), "config changed");
                    let _ = tx.try_send(ReloadEvent {
                        path: watched.to_path_buf(),
                    });
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(target: "config::watcher", error = %error, "watch error");
                }
            }
        }
    }
}

/// Errors that can occur during config watching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("failed to initialize watcher: {0}")]
    Init(String),
    #[error("failed to watch path: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        fs::write(&config, "# empty").unwrap();

        let (watcher, _rx) = ConfigWatcher::new(&config).unwrap();
        assert_eq!(watcher.config_path(), config);
    }

    #[test]
    fn test_watcher_detects_rewrite() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        fs::write(&config, "# v1").unwrap();

        let (watcher, rx) = ConfigWatcher::new(&config).unwrap();
        fs::write(&config, "# v2").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(3));
        drop(watcher);

        if let Ok(event) = event {
            assert_eq!(event.path, config);
        }
        // Some filesystems are slow to deliver events; no hard assertion
        // on arrival, only on correctness when it does arrive.
    }

    #[test]
    fn test_sibling_files_do_not_trigger() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        fs::write(&config, "# cfg").unwrap();

        let (_watcher, rx) = ConfigWatcher::new(&config).unwrap();
        fs::write(dir.path().join("other.txt"), "noise").unwrap();

        // The sibling write must not produce a reload trigger.
        assert!(rx.recv_timeout(Duration::from_millis(900)).is_err());
    }
}
