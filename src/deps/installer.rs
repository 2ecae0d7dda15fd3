//! Install missing packages with an external package manager.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Something that can install packages into the project.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the given packages. Returns true only if the install
    /// completed successfully.
    async fn install(&self, packages: &[String]) -> bool;
}

/// Runs `npm install <packages> --loglevel notice` in the project root.
pub struct NpmInstaller {
    program: String,
    cwd: PathBuf,
}

impl NpmInstaller {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: "npm".to_string(),
            cwd: cwd.into(),
        }
    }

    /// Use a different executable (tests, pnpm shims).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Installer for NpmInstaller {
    async fn install(&self, packages: &[String]) -> bool {
        if packages.is_empty() {
            return false;
        }

        let mut child = match Command::new(&self.program)
            .arg("install")
            .args(packages)
            .args(["--loglevel", "notice"])
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("[deps] Package install error: {}", e);
                return false;
            }
        };

        let stdout = child.stdout.take().map(|out| tokio::spawn(stream_lines(out)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(stream_lines(err)));

        let status = child.wait().await;

        for task in [stdout, stderr].into_iter().flatten() {
            let _ = task.await;
        }

        match status {
            Ok(status) if status.success() => {
                tracing::info!("[deps] Packages synced successfully.");
                true
            }
            Ok(status) => {
                tracing::warn!("[deps] Package install failed ({})", status);
                false
            }
            Err(e) => {
                tracing::warn!("[deps] Package install error: {}", e);
                false
            }
        }
    }
}

async fn stream_lines<R: AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            tracing::info!("[deps] {}", line);
        }
    }
}
