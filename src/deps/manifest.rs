//! Read the packages already declared in `package.json`.

use super::DepsError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    dependencies: HashMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: HashMap<String, serde_json::Value>,
}

/// Names under `dependencies` and `devDependencies`. A missing manifest
/// declares nothing.
pub async fn read_declared(manifest: &Path) -> Result<HashSet<String>, DepsError> {
    let raw = match tokio::fs::read_to_string(manifest).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(DepsError::Io(e)),
    };
    let pkg: PackageJson = serde_json::from_str(&raw)?;
    Ok(pkg
        .dependencies
        .into_keys()
        .chain(pkg.dev_dependencies.into_keys())
        .collect())
}
