//! devsync-hub: serves the editable files to agents and keeps the dev
//! server running.

use clap::Parser;
use devsync::cli::HubArgs;
use devsync::deps::{DependencyResolver, NpmInstaller};
use devsync::devserver::{DevServer, DevServerConfig};
use devsync::http;
use devsync::hub::Hub;
use devsync::log_relay::{Collector, LogRelay, RelayLayer};
use devsync::reload::HttpReloader;
use devsync::remote_vars::RemoteVariables;
use devsync::ws::protocol::CLOSE_GOING_AWAY;
use devsync::ws::room::Room;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = HubArgs::parse();

    let relay = LogRelay::new();
    let relay_layer = args
        .remote_hostname
        .as_ref()
        .map(|_| RelayLayer::new(relay.clone()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(relay_layer)
        .init();

    let root = args.root();
    let files = args.file_set()?;
    tracing::info!(
        "[hub] Serving {} from {}",
        files.wire_names().join(", "),
        root.display()
    );

    let collector = args.remote_hostname.as_deref().map(|host| {
        Collector::new(host, args.callback_token.clone(), args.http_timeout())
    });
    let flusher = collector
        .clone()
        .map(|collector| relay.spawn_flusher(collector, LOG_FLUSH_INTERVAL));

    let dev_server = if args.no_dev_server {
        None
    } else {
        match DevServerConfig::from_command_line(&args.dev_command, root.clone()) {
            Some(config) => {
                tracing::info!("[hub] Starting dev server: {}", args.dev_command);
                Some(DevServer::spawn(config))
            }
            None => {
                tracing::warn!("[hub] Empty dev command, not starting a dev server");
                None
            }
        }
    };

    let room = Arc::new(Room::new());
    let resolver = DependencyResolver::new(
        root.join("package.json"),
        Arc::new(NpmInstaller::new(root.clone())),
    );
    let reloader = Arc::new(HttpReloader::new(
        args.reload_url.clone(),
        args.http_timeout(),
    ));
    let hub = Hub::new(
        files,
        room.clone(),
        resolver,
        reloader,
        RemoteVariables::new(args.http_timeout()),
    )
    .with_preview_domain(args.preview_domain.clone());

    let app = http::router(Arc::new(hub), &args.ws_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "[hub] WebSocket server listening on port {} (path {})",
        args.port,
        args.ws_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(room))
        .await?;

    if let Some(dev_server) = dev_server {
        tracing::info!("[hub] Stopping dev server ({:?})", dev_server.state());
        dev_server.shutdown().await;
    }
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    if let Some(flusher) = flusher {
        flusher.abort();
    }
    if let Some(collector) = &collector {
        relay.flush(collector).await;
    }

    tracing::info!("[hub] Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after telling every agent we're going away.
async fn shutdown_signal(room: Arc<Room>) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("[hub] Shutting down...");
    room.close_all(CLOSE_GOING_AWAY, "Server shutting down").await;
}
