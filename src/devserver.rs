//! Keeps the dev server process running alongside the hub.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Pause before respawning an exited process
    pub restart_delay: Duration,
}

impl DevServerConfig {
    /// Split a shell-style command line on whitespace.
    pub fn from_command_line(command: &str, cwd: impl Into<PathBuf>) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            cwd: cwd.into(),
            restart_delay: Duration::from_secs(1),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevServerState {
    Starting,
    Running,
    Restarting,
    Stopped,
}

/// Handle to the supervising task.
pub struct DevServer {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<DevServerState>,
    task: JoinHandle<()>,
}

impl DevServer {
    /// Spawn the process and keep respawning it until [`DevServer::shutdown`].
    pub fn spawn(config: DevServerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(DevServerState::Starting);
        let task = tokio::spawn(supervise(config, shutdown_rx, state_tx));
        Self {
            shutdown_tx,
            state_rx,
            task,
        }
    }

    pub fn state(&self) -> DevServerState {
        *self.state_rx.borrow()
    }

    /// Kill the child and stop respawning.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

async fn supervise(
    config: DevServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<DevServerState>,
) {
    loop {
        let _ = state_tx.send(DevServerState::Starting);
        match spawn_child(&config) {
            Ok(mut child) => {
                let _ = state_tx.send(DevServerState::Running);
                tokio::select! {
                    status = child.wait() => {
                        tracing::warn!(
                            "[dev] Dev server exited ({}), restarting...",
                            describe(status)
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        let _ = child.kill().await;
                        let _ = state_tx.send(DevServerState::Stopped);
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::error!("[dev] Dev server process error: {}", e);
            }
        }

        let _ = state_tx.send(DevServerState::Restarting);
        tokio::select! {
            _ = tokio::time::sleep(config.restart_delay) => {}
            _ = shutdown_rx.changed() => {
                let _ = state_tx.send(DevServerState::Stopped);
                return;
            }
        }
    }
}

fn spawn_child(config: &DevServerConfig) -> std::io::Result<Child> {
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .current_dir(&config.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_output(stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_output(stderr));
    }
    Ok(child)
}

async fn forward_output<R: AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!("[dev] {}", line);
    }
}

fn describe(status: std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("wait failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_parsing() {
        let config = DevServerConfig::from_command_line("npm run dev:vite", "/project").unwrap();
        assert_eq!(config.program, "npm");
        assert_eq!(config.args, vec!["run", "dev:vite"]);
        assert!(DevServerConfig::from_command_line("   ", "/project").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_is_respawned() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("runs.txt");
        let config = DevServerConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo run >> {}", marker.display()),
            ],
            cwd: dir.path().to_path_buf(),
            restart_delay: Duration::from_millis(50),
        };

        let server = DevServer::spawn(config);
        tokio::time::sleep(Duration::from_millis(600)).await;
        server.shutdown().await;

        let runs = tokio::fs::read_to_string(&marker).await.unwrap();
        assert!(runs.lines().count() >= 2, "expected respawns, got {:?}", runs);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_stops_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = DevServerConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            cwd: dir.path().to_path_buf(),
            restart_delay: Duration::from_millis(50),
        };

        let server = DevServer::spawn(config);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.state(), DevServerState::Running);
        tokio::time::timeout(Duration::from_secs(5), server.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
