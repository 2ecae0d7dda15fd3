//! Debounced watcher over the editable files.
//!
//! Uses notify-debouncer-mini so an editor's multi-step save surfaces as a
//! single change once the file has been quiet for the stability window.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default quiet period before a write is reported.
pub const DEFAULT_STABILITY: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to start watcher: {0}")]
    Init(#[from] notify::Error),
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A settled write to one of the watched files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The configured disk path (not the canonicalized one)
    pub path: PathBuf,
}

/// Watches a fixed set of files. Dropping it tears the watch down.
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<FileChange>,
}

impl FileWatcher {
    /// Start watching `paths`. Files need not exist yet; their parent
    /// directories are created and watched. Nothing is reported for content
    /// already on disk when the watch starts.
    pub fn new(paths: &[PathBuf], stability: Duration) -> Result<Self, WatchError> {
        let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut dirs: HashSet<PathBuf> = HashSet::new();

        for path in paths {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(parent).map_err(|source| WatchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
            // FSEvents and friends report resolved paths
            let canonical_parent = parent
                .canonicalize()
                .unwrap_or_else(|_| parent.to_path_buf());
            if let Some(name) = path.file_name() {
                targets.insert(canonical_parent.join(name), path.clone());
                targets.insert(path.clone(), path.clone());
            }
            dirs.insert(canonical_parent);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(stability, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        // AnyContinuous fires while writes are still going on
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        if let Some(path) = match_target(&targets, &event.path) {
                            if !path.exists() {
                                // Deletions are not synced
                                continue;
                            }
                            if event_tx.send(FileChange { path }).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[watcher] Watcher error: {:?}", e);
                }
            }
        })?;

        for dir in &dirs {
            debouncer
                .watcher()
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Watch {
                    path: dir.clone(),
                    source,
                })?;
        }

        tracing::debug!("[watcher] Watching {} file(s)", paths.len());

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Wait for the next settled change.
    pub async fn recv(&mut self) -> Option<FileChange> {
        self.event_rx.recv().await
    }
}

fn match_target(targets: &HashMap<PathBuf, PathBuf>, event_path: &Path) -> Option<PathBuf> {
    if let Some(path) = targets.get(event_path) {
        return Some(path.clone());
    }
    let parent = event_path.parent()?.canonicalize().ok()?;
    let resolved = parent.join(event_path.file_name()?);
    targets.get(&resolved).cloned()
}
