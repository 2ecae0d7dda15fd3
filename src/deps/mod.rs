//! Dependency resolution for patched files.
//!
//! New file content is scanned for package references; anything not yet
//! declared in `package.json` is handed to the installer.

mod extract;
mod installer;
mod manifest;

pub use extract::extract_packages;
pub use installer::{Installer, NpmInstaller};
pub use manifest::read_declared;

use std::path::PathBuf;
use std::sync::Arc;

/// Dependency resolver errors.
#[derive(Debug, thiserror::Error)]
pub enum DepsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid package.json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Installs packages referenced by new content but not yet declared.
pub struct DependencyResolver {
    manifest: PathBuf,
    installer: Arc<dyn Installer>,
}

impl DependencyResolver {
    pub fn new(manifest: impl Into<PathBuf>, installer: Arc<dyn Installer>) -> Self {
        Self {
            manifest: manifest.into(),
            installer,
        }
    }

    /// Packages referenced by `code` that the manifest does not declare.
    pub async fn missing(&self, code: &str) -> Result<Vec<String>, DepsError> {
        let referenced = extract_packages(code);
        if referenced.is_empty() {
            return Ok(Vec::new());
        }
        let declared = read_declared(&self.manifest).await?;
        Ok(referenced
            .into_iter()
            .filter(|pkg| !declared.contains(pkg))
            .collect())
    }

    /// Install whatever `code` needs. Returns true only if an install ran
    /// and succeeded; every failure is logged and reported as false.
    pub async fn sync(&self, code: &str) -> bool {
        if code.is_empty() {
            return false;
        }
        let missing = match self.missing(code).await {
            Ok(missing) => missing,
            Err(e) => {
                tracing::warn!("[deps] Failed to read declared packages: {}", e);
                return false;
            }
        };
        if missing.is_empty() {
            return false;
        }

        tracing::info!("[deps] Installing missing packages: {}", missing.join(", "));
        self.installer.install(&missing).await
    }
}
