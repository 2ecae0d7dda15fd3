//! Command line arguments for the hub and agent binaries.

use crate::agent::reconnect::ReconnectPolicy;
use crate::agent::target::{normalize_target, DEFAULT_DOMAIN};
use crate::agent::AgentConfig;
use crate::files::{FileError, FileSet, DEFAULT_FILES};
use crate::http::DEFAULT_WS_PATH;
use crate::reload::DEFAULT_RELOAD_URL;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4387;
pub const DEFAULT_DEV_COMMAND: &str = "npm run dev:vite";

#[derive(Parser, Debug)]
#[command(name = "devsync-hub")]
#[command(about = "Serve editable source files to a devsync agent over WebSocket")]
pub struct HubArgs {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT, env = "DEVSYNC_PORT")]
    pub port: u16,

    /// Project root (defaults to the working directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Path the WebSocket endpoint is mounted on
    #[arg(long, default_value = DEFAULT_WS_PATH)]
    pub ws_path: String,

    /// Editable file wire name, e.g. /App.tsx (repeatable)
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Preview domain reported to agents after sync
    #[arg(long, env = "PREVIEW_DOMAIN")]
    pub preview_domain: Option<String>,

    /// Dev server reload endpoint
    #[arg(long, default_value = DEFAULT_RELOAD_URL)]
    pub reload_url: String,

    /// Command that runs the dev server
    #[arg(long, default_value = DEFAULT_DEV_COMMAND)]
    pub dev_command: String,

    /// Don't start or supervise a dev server
    #[arg(long)]
    pub no_dev_server: bool,

    /// Base URL of the remote log collector; log relay is off when unset
    #[arg(long, env = "REMOTE_HOSTNAME")]
    pub remote_hostname: Option<String>,

    /// Token sent with relayed logs
    #[arg(long, env = "CALLBACK_TOKEN")]
    pub callback_token: Option<String>,

    /// Timeout for outbound HTTP calls, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub http_timeout_ms: u64,
}

impl HubArgs {
    pub fn root(&self) -> PathBuf {
        resolve_root(self.root.as_ref())
    }

    pub fn file_set(&self) -> Result<FileSet, FileError> {
        build_file_set(self.root(), &self.files)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[derive(Parser, Debug)]
#[command(name = "devsync-agent")]
#[command(about = "Keep local source files in sync with a devsync hub")]
pub struct AgentArgs {
    /// Sandbox subdomain or full URL; prompted for when omitted
    pub target: Option<String>,

    /// Project root (defaults to the working directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Editable file wire name, e.g. /App.tsx (repeatable)
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Domain a bare subdomain target is expanded under
    #[arg(long, default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// WebSocket path appended to subdomain targets
    #[arg(long, default_value = DEFAULT_WS_PATH)]
    pub ws_path: String,

    /// Consecutive failed connects before giving up
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 1000)]
    pub initial_delay_ms: u64,

    #[arg(long, default_value_t = 30_000)]
    pub max_delay_ms: u64,

    /// Quiet period before a local write is synced, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub stability_ms: u64,

    /// Marker that identifies placeholder content the hub may overwrite
    #[arg(long, env = "DEVSYNC_PLACEHOLDER_SENTINEL")]
    pub placeholder_sentinel: Option<String>,
}

impl AgentArgs {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    /// Resolve into an [`AgentConfig`] for the given raw target.
    pub fn into_config(self, target: &str) -> Result<AgentConfig, FileError> {
        let mut files = build_file_set(resolve_root(self.root.as_ref()), &self.files)?;
        if let Some(sentinel) = &self.placeholder_sentinel {
            files = files.with_sentinel(sentinel.as_str());
        }
        Ok(AgentConfig {
            url: normalize_target(target, &self.domain, &self.ws_path),
            files,
            policy: self.policy(),
            stability: Duration::from_millis(self.stability_ms),
        })
    }
}

fn resolve_root(root: Option<&PathBuf>) -> PathBuf {
    match root {
        Some(root) => root.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn build_file_set(root: PathBuf, names: &[String]) -> Result<FileSet, FileError> {
    if names.is_empty() {
        FileSet::new(root, DEFAULT_FILES.iter())
    } else {
        FileSet::new(root, names.iter())
    }
}
