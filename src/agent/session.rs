//! Agent side of the sync protocol.
//!
//! `AgentSession` is a state machine over the connection lifecycle. It does
//! the file I/O itself but never touches the socket: every transition
//! returns [`Effects`] listing the messages to send and whether a fresh
//! watcher should be installed. The session outlives individual
//! connections, so fingerprints and authority survive reconnects.

use crate::files::{EditableFile, FileSet};
use crate::fingerprint::FingerprintMap;
use crate::ws::protocol::{Message, Patch};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingSync,
    Synced,
    Reconnecting,
    Terminated,
}

/// Which side owns a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Local edits win; incoming patches are ignored
    Local,
    /// Last content came from the hub
    Remote,
    /// Neither side had content at election time
    Unresolved,
}

/// Which way content flowed during the initial sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    RemoteToLocal,
    LocalToRemote,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::RemoteToLocal => f.write_str("remote → local"),
            Direction::LocalToRemote => f.write_str("local → remote"),
        }
    }
}

/// Summary of the initial sync, shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub preview_url: Option<String>,
    /// First direction content actually moved, if any
    pub direction: Option<Direction>,
    pub files: Vec<String>,
}

impl SyncReport {
    pub fn direction_label(&self) -> String {
        match self.direction {
            Some(direction) => direction.to_string(),
            None => "synced".to_string(),
        }
    }
}

/// Side effects requested by a transition.
#[derive(Debug, Default)]
pub struct Effects {
    pub outbound: Vec<Message>,
    /// Tear down any existing watcher and install a new one
    pub start_watcher: bool,
    pub report: Option<SyncReport>,
}

impl Effects {
    fn none() -> Self {
        Self::default()
    }
}

pub struct AgentSession {
    files: FileSet,
    state: SessionState,
    initial_sync_done: bool,
    fingerprints: FingerprintMap,
    authority: HashMap<String, Authority>,
    preview_domain: Option<String>,
}

impl AgentSession {
    pub fn new(files: FileSet) -> Self {
        let authority = files
            .iter()
            .map(|f| (f.wire_name().to_string(), Authority::Unresolved))
            .collect();
        Self {
            files,
            state: SessionState::Connecting,
            initial_sync_done: false,
            fingerprints: FingerprintMap::new(),
            authority,
            preview_domain: None,
        }
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_completed_initial_sync(&self) -> bool {
        self.initial_sync_done
    }

    pub fn authority(&self, wire_name: &str) -> Option<Authority> {
        self.authority.get(wire_name).copied()
    }

    pub fn fingerprints(&self) -> &FingerprintMap {
        &self.fingerprints
    }

    pub fn begin_connect(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// The socket is open.
    pub async fn on_open(&mut self) -> Effects {
        if !self.initial_sync_done {
            tracing::info!("[agent] Connected. Requesting sync...");
            self.state = SessionState::AwaitingSync;
            return Effects {
                outbound: vec![Message::SyncRequest],
                ..Effects::none()
            };
        }

        // After the first sync the local copy is the source of truth
        tracing::info!("[agent] Reconnected. Pushing local files to remote...");
        let mut outbound = Vec::new();
        for file in self.files.iter() {
            match file.read_existing().await {
                Ok(Some(code)) => {
                    self.fingerprints.record(file.wire_name(), &code);
                    self.authority
                        .insert(file.wire_name().to_string(), Authority::Local);
                    outbound.push(push_patch(file, code));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("[agent] Error reading local file: {}", e),
            }
        }
        tracing::info!("[agent] Synced local → remote.");

        self.state = SessionState::Synced;
        Effects {
            outbound,
            start_watcher: true,
            report: None,
        }
    }

    pub async fn on_message(&mut self, msg: Message) -> Effects {
        match msg {
            Message::SyncResponse {
                files,
                code,
                preview_domain,
            } => {
                if self.state != SessionState::AwaitingSync {
                    tracing::debug!("[agent] Ignoring unsolicited sync response");
                    return Effects::none();
                }
                self.elect(files, code, preview_domain).await
            }
            Message::Patch(patch) => {
                self.apply_remote_patch(patch).await;
                Effects::none()
            }
            Message::SyncRequest | Message::UpdateTestData { .. } => {
                tracing::debug!("[agent] Ignoring hub-bound message");
                Effects::none()
            }
        }
    }

    /// A watched file settled after a local write.
    pub async fn on_local_change(&mut self, path: &Path) -> Effects {
        if self.state != SessionState::Synced {
            return Effects::none();
        }
        let Some(file) = self.files.by_disk_path(path) else {
            return Effects::none();
        };

        let code = match file.read().await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!("[agent] Error reading file: {}", e);
                return Effects::none();
            }
        };
        if !self.fingerprints.observe(file.wire_name(), &code) {
            return Effects::none();
        }

        tracing::info!(
            "[agent] Change detected in {}, syncing to remote...",
            file.wire_name()
        );
        self.authority
            .insert(file.wire_name().to_string(), Authority::Local);
        Effects {
            outbound: vec![push_patch(file, code)],
            ..Effects::none()
        }
    }

    pub fn on_disconnect(&mut self) {
        if self.state != SessionState::Terminated {
            self.state = SessionState::Reconnecting;
        }
    }

    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }

    async fn elect(
        &mut self,
        mut remote_files: BTreeMap<String, String>,
        legacy_code: Option<String>,
        preview_domain: Option<String>,
    ) -> Effects {
        if remote_files.is_empty() {
            if let Some(code) = legacy_code {
                remote_files.insert(self.files.default_file().wire_name().to_string(), code);
            }
        }

        let mut outbound = Vec::new();
        let mut direction = None;

        for file in self.files.iter() {
            let name = file.wire_name();
            let remote = remote_files.get(name).map(String::as_str).unwrap_or("");
            let local = match file.read_existing().await {
                Ok(local) => local.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("[agent] Skipping {}: {}", name, e);
                    continue;
                }
            };

            if self.files.is_placeholder(&local) && !remote.is_empty() {
                if let Err(e) = file.write(remote).await {
                    tracing::warn!("[agent] Failed to accept remote {}: {}", name, e);
                    continue;
                }
                self.fingerprints.record(name, remote);
                self.authority.insert(name.to_string(), Authority::Remote);
                direction.get_or_insert(Direction::RemoteToLocal);
            } else if !local.trim().is_empty() {
                self.fingerprints.record(name, &local);
                self.authority.insert(name.to_string(), Authority::Local);
                outbound.push(push_patch(file, local));
                direction.get_or_insert(Direction::LocalToRemote);
            } else {
                self.authority.insert(name.to_string(), Authority::Unresolved);
            }
        }

        self.preview_domain = preview_domain.filter(|d| !d.is_empty());
        self.initial_sync_done = true;
        self.state = SessionState::Synced;

        let report = SyncReport {
            preview_url: self.preview_domain.as_deref().map(preview_url),
            direction,
            files: self.files.wire_names().into_iter().map(String::from).collect(),
        };
        Effects {
            outbound,
            start_watcher: true,
            report: Some(report),
        }
    }

    async fn apply_remote_patch(&mut self, patch: Patch) {
        if self.state != SessionState::Synced {
            tracing::debug!("[agent] Ignoring patch before initial sync");
            return;
        }
        let file = match self.files.resolve(patch.filename.as_deref()) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("[agent] Ignoring remote patch: {}", e);
                return;
            }
        };
        let name = file.wire_name();

        if self.authority.get(name) == Some(&Authority::Local) {
            tracing::info!(
                "[agent] Ignoring remote patch for {} (local is source of truth).",
                name
            );
            return;
        }
        if self.fingerprints.is_unchanged(name, &patch.code) {
            return;
        }
        if let Err(e) = file.write(&patch.code).await {
            tracing::warn!("[agent] Failed to apply remote patch: {}", e);
            return;
        }
        let fingerprint = self.fingerprints.record(name, &patch.code);
        tracing::info!("[agent] Applied remote patch for {} ({})", name, fingerprint);
        self.authority.insert(name.to_string(), Authority::Remote);
    }
}

fn push_patch(file: &EditableFile, code: String) -> Message {
    Message::Patch(Patch::new(file.wire_name(), code).with_force_hmr())
}

fn preview_url(domain: &str) -> String {
    if domain.starts_with("http") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}
