//! Agent side: connects to a hub and keeps the local copies in sync.

pub mod client;
pub mod reconnect;
pub mod session;
pub mod target;

use crate::files::{FileError, FileSet};
use reconnect::ReconnectPolicy;
use std::time::Duration;

pub use client::run;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no hub target given")]
    MissingTarget,
    #[error(transparent)]
    Files(#[from] FileError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything the agent loop needs.
#[derive(Debug)]
pub struct AgentConfig {
    /// Normalized WebSocket URL
    pub url: String,
    pub files: FileSet,
    pub policy: ReconnectPolicy,
    /// Quiet period before a local write is synced
    pub stability: Duration,
}

/// Why the agent stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Hub closed with "going away"
    HubShutdown,
    /// Ctrl-C
    Interrupted,
    /// Reconnect attempts exhausted
    GaveUp,
}

impl Exit {
    pub fn code(self) -> i32 {
        match self {
            Exit::HubShutdown | Exit::Interrupted => 0,
            Exit::GaveUp => 1,
        }
    }
}
