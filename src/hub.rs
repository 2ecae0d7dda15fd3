//! Hub side of the sync protocol.
//!
//! The hub owns the canonical copy of every editable file. It answers sync
//! requests, applies incoming patches to disk (installing dependencies and
//! reloading the dev server as needed) and relays each applied patch to
//! every other connected peer.

use crate::deps::DependencyResolver;
use crate::files::{EditableFile, FileError, FileSet};
use crate::reload::Reloader;
use crate::remote_vars::{render_test_data, RemoteVariables};
use crate::ws::connection::WsConnection;
use crate::ws::protocol::{Message, Patch};
use crate::ws::room::Room;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Generated test data module, relative to the project root.
pub const TEST_DATA_FILE: &str = "src/testData.ts";

/// What applying a patch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Sender already delivered this exact content
    Duplicate,
    /// Disk already held this content
    Unchanged,
    /// Content written to disk
    Written { reloaded: bool, broadcast_to: usize },
    /// Empty patch restored the original content
    Restored { broadcast_to: usize },
    /// Empty patch, but the file was never overwritten
    NothingToRestore,
}

pub struct Hub {
    files: FileSet,
    room: Arc<Room>,
    resolver: DependencyResolver,
    reloader: Arc<dyn Reloader>,
    remote_vars: RemoteVariables,
    preview_domain: Option<String>,
    /// Serializes patch application across connections
    apply_lock: Mutex<()>,
}

impl Hub {
    pub fn new(
        files: FileSet,
        room: Arc<Room>,
        resolver: DependencyResolver,
        reloader: Arc<dyn Reloader>,
        remote_vars: RemoteVariables,
    ) -> Self {
        Self {
            files,
            room,
            resolver,
            reloader,
            remote_vars,
            preview_domain: None,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn with_preview_domain(mut self, preview_domain: Option<String>) -> Self {
        self.preview_domain = preview_domain.filter(|d| !d.is_empty());
        self
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Decode and dispatch one text frame. Malformed messages are logged
    /// and dropped; the connection stays open.
    pub async fn handle_text(&self, conn: &WsConnection, text: &str) {
        match Message::decode(text) {
            Ok(msg) => self.handle_message(conn, msg).await,
            Err(e) => tracing::warn!("[hub] Invalid message: {}", e),
        }
    }

    pub async fn handle_message(&self, conn: &WsConnection, msg: Message) {
        match msg {
            Message::SyncRequest => {
                tracing::info!("[hub] Sync requested, sending current files");
                if !self.send_sync_response(conn).await {
                    tracing::warn!("[hub] Failed to queue sync response for {}", conn.id);
                }
            }
            Message::Patch(patch) => {
                let filename = patch
                    .filename
                    .clone()
                    .unwrap_or_else(|| self.files.default_file().wire_name().to_string());
                tracing::info!("[hub] Patching {}", filename);
                match self.apply_patch(conn, patch).await {
                    Ok(outcome) => tracing::debug!("[hub] Patch {}: {:?}", filename, outcome),
                    Err(e) => tracing::warn!("[hub] Patch {} failed: {}", filename, e),
                }
            }
            Message::UpdateTestData { test_data } => {
                if let Err(e) = self.update_test_data(test_data).await {
                    tracing::warn!("[hub] Test data update failed: {}", e);
                }
            }
            Message::SyncResponse { .. } => {
                tracing::warn!("[hub] Invalid message: unexpected sync response");
            }
        }
    }

    /// Queue every editable file's current content for `conn`.
    ///
    /// Holds the apply lock until the response is queued, so a patch from
    /// another peer lands either wholly before it (and is in the snapshot)
    /// or after it (and is relayed behind it).
    pub async fn send_sync_response(&self, conn: &WsConnection) -> bool {
        let _guard = self.apply_lock.lock().await;
        let response = self.sync_response(conn).await;
        conn.try_send_message(&response)
    }

    /// What is sent is recorded as this connection's view of each file.
    async fn sync_response(&self, conn: &WsConnection) -> Message {
        let mut files = BTreeMap::new();
        for file in self.files.iter() {
            let content = match file.read().await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("[hub] {}", e);
                    String::new()
                }
            };
            files.insert(file.wire_name().to_string(), content);
        }

        {
            let mut fingerprints = conn.fingerprints().lock().await;
            for (name, content) in &files {
                fingerprints.record(name, content);
            }
        }

        let code = files.get(self.files.default_file().wire_name()).cloned();
        Message::SyncResponse {
            files,
            code: Some(code.unwrap_or_default()),
            preview_domain: Some(self.preview_domain.clone().unwrap_or_default()),
        }
    }

    /// Apply a patch sent by `conn` and relay it to the other peers.
    pub async fn apply_patch(
        &self,
        conn: &WsConnection,
        patch: Patch,
    ) -> Result<PatchOutcome, FileError> {
        let file = self.files.resolve(patch.filename.as_deref())?;
        let wire_name = file.wire_name().to_string();

        if conn
            .fingerprints()
            .lock()
            .await
            .is_unchanged(&wire_name, &patch.code)
        {
            tracing::debug!("[hub] Duplicate patch for {}, ignoring", wire_name);
            return Ok(PatchOutcome::Duplicate);
        }

        let _guard = self.apply_lock.lock().await;

        let outcome = if patch.code.is_empty() {
            self.restore_original(file).await?
        } else {
            self.write_patch(file, &patch).await?
        };

        conn.fingerprints()
            .lock()
            .await
            .record(&wire_name, &patch.code);

        // Relay only what actually changed on disk
        let outcome = match outcome {
            PatchOutcome::Written { reloaded, .. } => PatchOutcome::Written {
                reloaded,
                broadcast_to: self.relay(conn, &wire_name, patch.code).await,
            },
            PatchOutcome::Restored { .. } => {
                // Peers get the restored content, not the empty request
                let restored = file.original().await.map(|o| o.content).unwrap_or_default();
                PatchOutcome::Restored {
                    broadcast_to: self.relay(conn, &wire_name, restored).await,
                }
            }
            other => other,
        };
        Ok(outcome)
    }

    async fn write_patch(
        &self,
        file: &EditableFile,
        patch: &Patch,
    ) -> Result<PatchOutcome, FileError> {
        if file.snapshot_original().await? {
            tracing::debug!("[hub] Captured original content of {}", file.wire_name());
        }

        let installed = self.resolver.sync(&patch.code).await;

        let current = file.read().await?;
        if current == patch.code {
            tracing::info!("[hub] No changes to {}, skipping write", file.wire_name());
            return Ok(PatchOutcome::Unchanged);
        }

        file.write(&patch.code).await?;

        let reloaded = installed || patch.force_hmr();
        if reloaded {
            self.reloader
                .reload(&self.relative_path(file), installed)
                .await;
        }
        Ok(PatchOutcome::Written {
            reloaded,
            broadcast_to: 0,
        })
    }

    async fn restore_original(&self, file: &EditableFile) -> Result<PatchOutcome, FileError> {
        let original = match file.original().await {
            Some(original) => original,
            None => {
                tracing::info!(
                    "[hub] {} was never overwritten, nothing to restore",
                    file.wire_name()
                );
                return Ok(PatchOutcome::NothingToRestore);
            }
        };

        if file.read().await? == original.content {
            tracing::info!("[hub] No changes to {}, skipping write", file.wire_name());
            return Ok(PatchOutcome::Unchanged);
        }

        tracing::info!("[hub] Restoring original content of {}", file.wire_name());
        file.write(&original.content).await?;
        self.reloader.reload(&self.relative_path(file), false).await;
        Ok(PatchOutcome::Restored { broadcast_to: 0 })
    }

    async fn relay(&self, conn: &WsConnection, wire_name: &str, code: String) -> usize {
        let relayed = Patch::new(wire_name, code);
        self.room.broadcast_patch_except(&conn.id, &relayed).await
    }

    /// Resolve remote variables and regenerate the test data module.
    /// Returns false when the generated file was already up to date.
    pub async fn update_test_data(&self, test_data: Map<String, Value>) -> Result<bool, FileError> {
        let resolved = self.remote_vars.resolve(test_data).await;
        let content = render_test_data(&resolved);
        let path = self.files.root().join(TEST_DATA_FILE);

        let current = match tokio::fs::read_to_string(&path).await {
            Ok(current) => current,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(FileError::Read { path, source }),
        };
        if current == content {
            tracing::info!("[hub] No changes to testData.ts, skipping write");
            return Ok(false);
        }

        write_file(&path, &content).await?;
        self.reloader.reload(TEST_DATA_FILE, false).await;
        Ok(true)
    }

    /// Disk path relative to the project root, as the dev server knows it.
    fn relative_path(&self, file: &EditableFile) -> String {
        file.disk_path()
            .strip_prefix(self.files.root())
            .unwrap_or(file.disk_path())
            .to_string_lossy()
            .replace('\\', "/")
    }
}

async fn write_file(path: &Path, content: &str) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| FileError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| FileError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::Installer;
    use crate::ws::connection::OutgoingMessage;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingReloader {
        calls: StdMutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl Reloader for RecordingReloader {
        async fn reload(&self, disk_path: &str, restart: bool) {
            self.calls
                .lock()
                .unwrap()
                .push((disk_path.to_string(), restart));
        }
    }

    struct FakeInstaller {
        succeed: bool,
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install(&self, _packages: &[String]) -> bool {
            self.succeed
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        hub: Hub,
        reloader: Arc<RecordingReloader>,
    }

    fn fixture(install_succeeds: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files = FileSet::with_defaults(dir.path());
        let resolver = DependencyResolver::new(
            dir.path().join("package.json"),
            Arc::new(FakeInstaller {
                succeed: install_succeeds,
            }),
        );
        let reloader = Arc::new(RecordingReloader::default());
        let hub = Hub::new(
            files,
            Arc::new(Room::new()),
            resolver,
            reloader.clone(),
            RemoteVariables::new(Duration::from_millis(200)),
        );
        Fixture {
            _dir: dir,
            hub,
            reloader,
        }
    }

    async fn connect(hub: &Hub) -> (Arc<WsConnection>, mpsc::Receiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(WsConnection::new(tx));
        hub.room().add_connection(conn.clone()).await;
        (conn, rx)
    }

    fn next_message(rx: &mut mpsc::Receiver<OutgoingMessage>) -> Option<Message> {
        match rx.try_recv() {
            Ok(OutgoingMessage::Text(text)) => Some(Message::decode(&text).unwrap()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_patch_writes_and_reloads_when_forced() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", "v1").with_force_hmr())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Written {
                reloaded: true,
                broadcast_to: 0
            }
        );
        assert_eq!(f.hub.files().default_file().read().await.unwrap(), "v1");
        assert_eq!(
            *f.reloader.calls.lock().unwrap(),
            vec![("src/App.tsx".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_repeated_patch_is_idempotent() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let (_b, mut b_rx) = connect(&f.hub).await;

        let patch = Patch::new("/App.tsx", "v1");
        f.hub.apply_patch(&a, patch.clone()).await.unwrap();
        assert!(next_message(&mut b_rx).is_some());

        let outcome = f.hub.apply_patch(&a, patch).await.unwrap();
        assert_eq!(outcome, PatchOutcome::Duplicate);
        assert!(next_message(&mut b_rx).is_none());
    }

    #[tokio::test]
    async fn test_unchanged_disk_skips_write_and_broadcast() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let (_b, mut b_rx) = connect(&f.hub).await;
        f.hub.files().default_file().write("same").await.unwrap();

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", "same").with_force_hmr())
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert!(next_message(&mut b_rx).is_none());
        assert!(f.reloader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_others_not_sender() {
        let f = fixture(false);
        let (a, mut a_rx) = connect(&f.hub).await;
        let (_b, mut b_rx) = connect(&f.hub).await;

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/OpenGraphCard.tsx", "card").with_force_hmr())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Written {
                reloaded: true,
                broadcast_to: 1
            }
        );

        assert_eq!(
            next_message(&mut b_rx),
            Some(Message::Patch(Patch::new("/OpenGraphCard.tsx", "card")))
        );
        assert!(next_message(&mut a_rx).is_none());
    }

    #[tokio::test]
    async fn test_empty_patch_restores_original() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let file = f.hub.files().default_file();
        file.write("placeholder").await.unwrap();

        f.hub
            .apply_patch(&a, Patch::new("/App.tsx", "real app"))
            .await
            .unwrap();
        f.hub
            .apply_patch(&a, Patch::new("/App.tsx", "real app v2"))
            .await
            .unwrap();
        assert_eq!(file.read().await.unwrap(), "real app v2");

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", ""))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Restored { broadcast_to: 0 });
        assert_eq!(file.read().await.unwrap(), "placeholder");
    }

    #[tokio::test]
    async fn test_restore_relays_restored_content() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let (_b, mut b_rx) = connect(&f.hub).await;
        f.hub.files().default_file().write("placeholder").await.unwrap();

        f.hub
            .apply_patch(&a, Patch::new("/App.tsx", "real app"))
            .await
            .unwrap();
        assert_eq!(
            next_message(&mut b_rx),
            Some(Message::Patch(Patch::new("/App.tsx", "real app")))
        );

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", ""))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Restored { broadcast_to: 1 });
        assert_eq!(
            next_message(&mut b_rx),
            Some(Message::Patch(Patch::new("/App.tsx", "placeholder")))
        );
    }

    #[tokio::test]
    async fn test_sync_request_racing_a_patch_converges() {
        let f = fixture(false);
        let (b, _b_rx) = connect(&f.hub).await;
        let file = f.hub.files().default_file();

        for round in 0..20 {
            let (a, mut a_rx) = connect(&f.hub).await;
            let code = format!("v{}", round);
            tokio::join!(
                f.hub.handle_message(&a, Message::SyncRequest),
                f.hub
                    .handle_message(&b, Message::Patch(Patch::new("/App.tsx", code.clone()))),
            );

            // Replay what A received the way an agent would: patches before
            // the sync response are dropped, later ones are applied.
            let mut seen: Option<String> = None;
            while let Some(msg) = next_message(&mut a_rx) {
                match msg {
                    Message::SyncResponse { files, .. } => {
                        seen = Some(files["/App.tsx"].clone());
                    }
                    Message::Patch(patch) if seen.is_some() => seen = Some(patch.code),
                    _ => {}
                }
            }

            let on_disk = file.read().await.unwrap();
            assert_eq!(on_disk, code);
            assert_eq!(seen.as_deref(), Some(on_disk.as_str()), "round {}", round);
            f.hub.room().remove_connection(&a.id).await;
        }
    }

    #[tokio::test]
    async fn test_empty_patch_without_snapshot_writes_nothing() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let file = f.hub.files().default_file();
        file.write("placeholder").await.unwrap();

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", ""))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::NothingToRestore);
        assert_eq!(file.read().await.unwrap(), "placeholder");
    }

    #[tokio::test]
    async fn test_install_triggers_restart() {
        let f = fixture(true);
        let (a, _a_rx) = connect(&f.hub).await;

        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", "import dayjs from 'dayjs';"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Written {
                reloaded: true,
                broadcast_to: 0
            }
        );
        assert_eq!(
            *f.reloader.calls.lock().unwrap(),
            vec![("src/App.tsx".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_failed_install_does_not_force_reload() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;

        f.hub
            .apply_patch(&a, Patch::new("/App.tsx", "import dayjs from 'dayjs';"))
            .await
            .unwrap();
        assert!(f.reloader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_file_rejected() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let result = f.hub.apply_patch(&a, Patch::new("/secrets.env", "x")).await;
        assert!(matches!(result, Err(FileError::UnknownFile(_))));
    }

    #[tokio::test]
    async fn test_missing_filename_targets_default_file() {
        let f = fixture(false);
        let (a, _a_rx) = connect(&f.hub).await;
        let patch = Patch {
            code: "default".to_string(),
            filename: None,
            force_hmr: None,
        };
        f.hub.apply_patch(&a, patch).await.unwrap();
        assert_eq!(f.hub.files().default_file().read().await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_sync_response_lists_every_file() {
        let f = fixture(false);
        let (a, mut a_rx) = connect(&f.hub).await;
        f.hub.files().default_file().write("app").await.unwrap();

        assert!(f.hub.send_sync_response(&a).await);
        match next_message(&mut a_rx).unwrap() {
            Message::SyncResponse { files, code, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(files["/App.tsx"], "app");
                assert_eq!(files["/OpenGraphCard.tsx"], "");
                assert_eq!(code.as_deref(), Some("app"));
            }
            other => panic!("expected sync response, got {:?}", other),
        }

        // The agent echoing what it was just sent is a no-op
        let outcome = f
            .hub
            .apply_patch(&a, Patch::new("/App.tsx", "app").with_force_hmr())
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_update_test_data_writes_module_once() {
        let f = fixture(false);
        let data = serde_json::json!({"name": "Ada"}).as_object().cloned().unwrap();

        assert!(f.hub.update_test_data(data.clone()).await.unwrap());
        assert!(!f.hub.update_test_data(data).await.unwrap());

        let written = tokio::fs::read_to_string(f.hub.files().root().join(TEST_DATA_FILE))
            .await
            .unwrap();
        assert!(written.starts_with("export const testData"));
        assert!(written.contains("\"name\": \"Ada\""));
        assert_eq!(
            *f.reloader.calls.lock().unwrap(),
            vec![(TEST_DATA_FILE.to_string(), false)]
        );
    }
}
