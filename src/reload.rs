//! Ask the dev server to reload or restart after a file change.

use async_trait::async_trait;
use std::time::Duration;

/// Default reload endpoint exposed by the dev server.
pub const DEFAULT_RELOAD_URL: &str = "http://127.0.0.1:5173/__reload";

/// Triggers a reload of the running app.
#[async_trait]
pub trait Reloader: Send + Sync {
    /// Reload clients showing `disk_path`, or restart the dev server when
    /// `restart` is set. Failures are logged, never returned.
    async fn reload(&self, disk_path: &str, restart: bool);
}

/// Calls the dev server's reload endpoint over HTTP.
pub struct HttpReloader {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpReloader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// `<endpoint>?path=<encoded>[&restart]`
    pub fn reload_url(&self, disk_path: &str, restart: bool) -> String {
        let mut url = format!(
            "{}?path={}",
            self.endpoint,
            urlencoding::encode(disk_path)
        );
        if restart {
            url.push_str("&restart");
        }
        url
    }
}

#[async_trait]
impl Reloader for HttpReloader {
    async fn reload(&self, disk_path: &str, restart: bool) {
        if restart {
            tracing::info!("[reload] Dependency change detected, scheduling full restart");
        } else {
            tracing::info!("[reload] Large change detected, scheduling full reload");
        }

        let url = self.reload_url(disk_path, restart);
        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("[reload] Reload accepted for {}", disk_path);
            }
            Ok(resp) => {
                tracing::warn!("[reload] Reload returned status {}", resp.status());
            }
            Err(e) => {
                tracing::warn!(
                    "[reload] Reload failed (server may not be ready): {}",
                    e
                );
            }
        }
    }
}
