//! The fixed set of editable files shared by hub and agent.
//!
//! Files are addressed on the wire by a slash-prefixed logical name
//! (`/App.tsx`) and live on disk under `<root>/src/`.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Wire names synced when nothing else is configured.
pub const DEFAULT_FILES: &[&str] = &["/App.tsx", "/OpenGraphCard.tsx"];

/// Directory (relative to the project root) that holds the editable files.
pub const SOURCE_DIR: &str = "src";

/// Errors from reading or writing editable files.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("unknown file: {0}")]
    UnknownFile(String),
    #[error("invalid wire filename: {0}")]
    InvalidName(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content captured before the first non-empty write, so an empty patch
/// can restore it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalSnapshot {
    pub content: String,
}

/// A single editable file.
#[derive(Debug)]
pub struct EditableFile {
    wire_name: String,
    disk_path: PathBuf,
    original: Mutex<Option<OriginalSnapshot>>,
}

impl EditableFile {
    fn new(wire_name: String, disk_path: PathBuf) -> Self {
        Self {
            wire_name,
            disk_path,
            original: Mutex::new(None),
        }
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    /// Read the current on-disk content. A missing file reads as "".
    pub async fn read(&self) -> Result<String, FileError> {
        match tokio::fs::read_to_string(&self.disk_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(FileError::Read {
                path: self.disk_path.clone(),
                source,
            }),
        }
    }

    /// Read the current on-disk content, or `None` if the file does not exist.
    pub async fn read_existing(&self) -> Result<Option<String>, FileError> {
        match tokio::fs::read_to_string(&self.disk_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FileError::Read {
                path: self.disk_path.clone(),
                source,
            }),
        }
    }

    /// Write content, creating the parent directory if needed.
    pub async fn write(&self, content: &str) -> Result<(), FileError> {
        if let Some(parent) = self.disk_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FileError::Write {
                    path: self.disk_path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&self.disk_path, content)
            .await
            .map_err(|source| FileError::Write {
                path: self.disk_path.clone(),
                source,
            })
    }

    /// Snapshot the current disk content as the original, unless one was
    /// already taken. Returns true if this call took the snapshot.
    pub async fn snapshot_original(&self) -> Result<bool, FileError> {
        let mut original = self.original.lock().await;
        if original.is_some() {
            return Ok(false);
        }
        let content = self.read().await?;
        *original = Some(OriginalSnapshot { content });
        Ok(true)
    }

    pub async fn original(&self) -> Option<OriginalSnapshot> {
        self.original.lock().await.clone()
    }
}

/// The configured set of editable files for one project root.
#[derive(Debug)]
pub struct FileSet {
    root: PathBuf,
    files: Vec<EditableFile>,
    sentinel: Option<String>,
}

impl FileSet {
    /// Build a file set from wire names. The first name is the default file
    /// used by messages that omit `filename`.
    pub fn new<I, S>(root: impl Into<PathBuf>, wire_names: I) -> Result<Self, FileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = root.into();
        let mut files: Vec<EditableFile> = Vec::new();
        for name in wire_names {
            let name = name.as_ref();
            let disk_path = to_disk_path(&root, name)?;
            if files.iter().any(|f| f.wire_name == name) {
                continue;
            }
            files.push(EditableFile::new(name.to_string(), disk_path));
        }
        if files.is_empty() {
            return Err(FileError::InvalidName("(empty file set)".to_string()));
        }
        Ok(Self {
            root,
            files,
            sentinel: None,
        })
    }

    /// File set with [`DEFAULT_FILES`].
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let files = DEFAULT_FILES
            .iter()
            .map(|name| {
                let rel = name.trim_start_matches('/');
                EditableFile::new(name.to_string(), root.join(SOURCE_DIR).join(rel))
            })
            .collect();
        Self {
            root,
            files,
            sentinel: None,
        }
    }

    /// Content marker that identifies a placeholder file.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        let sentinel = sentinel.into();
        self.sentinel = if sentinel.is_empty() {
            None
        } else {
            Some(sentinel)
        };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> impl Iterator<Item = &EditableFile> {
        self.files.iter()
    }

    pub fn wire_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.wire_name()).collect()
    }

    pub fn disk_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.disk_path.clone()).collect()
    }

    /// The file messages fall back to when `filename` is omitted.
    pub fn default_file(&self) -> &EditableFile {
        &self.files[0]
    }

    pub fn get(&self, wire_name: &str) -> Option<&EditableFile> {
        self.files.iter().find(|f| f.wire_name == wire_name)
    }

    /// Look up a file, falling back to the default when no name is given.
    pub fn resolve(&self, wire_name: Option<&str>) -> Result<&EditableFile, FileError> {
        match wire_name {
            None => Ok(self.default_file()),
            Some(name) => self
                .get(name)
                .ok_or_else(|| FileError::UnknownFile(name.to_string())),
        }
    }

    /// Map a disk path back to the file it belongs to.
    pub fn by_disk_path(&self, path: &Path) -> Option<&EditableFile> {
        self.files.iter().find(|f| f.disk_path == path).or_else(|| {
            // Watchers may report canonicalized paths.
            let canonical = path.canonicalize().ok()?;
            self.files.iter().find(|f| {
                f.disk_path
                    .canonicalize()
                    .map(|p| p == canonical)
                    .unwrap_or(false)
            })
        })
    }

    /// Whitespace-only content, or content carrying the sentinel.
    pub fn is_placeholder(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return true;
        }
        match &self.sentinel {
            Some(sentinel) => content.contains(sentinel.as_str()),
            None => false,
        }
    }
}

/// `<root>/src/<name without leading slash>`.
pub fn to_disk_path(root: &Path, wire_name: &str) -> Result<PathBuf, FileError> {
    let rel = wire_name
        .strip_prefix('/')
        .ok_or_else(|| FileError::InvalidName(wire_name.to_string()))?;
    if rel.is_empty() || rel.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(FileError::InvalidName(wire_name.to_string()));
    }
    Ok(root.join(SOURCE_DIR).join(rel))
}
