#![allow(dead_code)]

use async_trait::async_trait;
use devsync::deps::{DependencyResolver, Installer};
use devsync::files::FileSet;
use devsync::hub::Hub;
use devsync::reload::Reloader;
use devsync::remote_vars::RemoteVariables;
use devsync::ws::room::Room;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records reload requests instead of calling a dev server.
#[derive(Default)]
pub struct RecordingReloader {
    pub calls: Mutex<Vec<(String, bool)>>,
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

/// Never installs anything.
pub struct NoInstall;

#[async_trait]
impl Installer for NoInstall {
    async fn install(&self, _packages: &[String]) -> bool {
        false
    }
}

pub fn test_hub(root: &Path) -> (Arc<Hub>, Arc<RecordingReloader>) {
    let reloader = Arc::new(RecordingReloader::default());
    let hub = Hub::new(
        FileSet::with_defaults(root),
        Arc::new(Room::new()),
        DependencyResolver::new(root.join("package.json"), Arc::new(NoInstall)),
        reloader.clone(),
        RemoteVariables::new(Duration::from_secs(1)),
    )
    .with_preview_domain(Some("sb-test.vercel.run".to_string()));
    (Arc::new(hub), reloader)
}

/// Serve a hub on an ephemeral port.
pub async fn spawn_hub(root: &Path) -> (SocketAddr, Arc<Hub>, Arc<RecordingReloader>) {
    let (hub, reloader) = test_hub(root);
    let app = devsync::http::router(hub.clone(), devsync::http::DEFAULT_WS_PATH);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub, reloader)
}
