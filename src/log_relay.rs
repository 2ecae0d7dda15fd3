//! Best-effort shipping of hub log lines to a remote collector.
//!
//! Lines are buffered with their timestamp and drained on a fixed interval.
//! A batch that fails to deliver is dropped; logging never blocks sync.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Path appended to the remote hostname when posting logs.
pub const APPEND_LOGS_PATH: &str = "/v1/apps/load/appId/_hooks/spa-build-servers/append-logs";

/// One buffered log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogItem {
    pub timestamp_ms: i64,
    pub value: String,
}

/// Shared append-only buffer of log lines.
#[derive(Debug, Clone, Default)]
pub struct LogRelay {
    buffer: Arc<Mutex<Vec<LogItem>>>,
}

impl LogRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line stamped with the current time.
    pub fn push(&self, value: impl Into<String>) {
        let item = LogItem {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            value: value.into(),
        };
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(item);
        }
    }

    /// Take everything buffered so far.
    pub fn drain(&self) -> Vec<LogItem> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the buffer into `collector` every `interval` until the task is
    /// aborted.
    pub fn spawn_flusher(
        &self,
        collector: Collector,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                relay.flush(&collector).await;
            }
        })
    }

    /// Drain once and deliver. Returns how many lines were sent.
    pub async fn flush(&self, collector: &Collector) -> usize {
        let batch = self.drain();
        if batch.is_empty() {
            return 0;
        }
        let count = batch.len();
        if collector.send(&batch).await {
            count
        } else {
            0
        }
    }
}

#[derive(Serialize)]
struct AppendLogs<'a> {
    logs: &'a [LogItem],
}

/// Remote endpoint that accepts batches of log lines.
#[derive(Debug, Clone)]
pub struct Collector {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl Collector {
    pub fn new(remote_hostname: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}{}", remote_hostname.trim_end_matches('/'), APPEND_LOGS_PATH),
            token,
            timeout,
        }
    }

    /// Post a batch. Returns false on any failure.
    pub async fn send(&self, logs: &[LogItem]) -> bool {
        let mut req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&AppendLogs { logs });
        if let Some(token) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Forwards INFO-and-above events from this crate into a [`LogRelay`].
pub struct RelayLayer {
    relay: LogRelay,
}

impl RelayLayer {
    pub fn new(relay: LogRelay) -> Self {
        Self { relay }
    }
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::INFO || !meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            self.relay.push(message);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_push_and_drain() {
        let relay = LogRelay::new();
        relay.push("[hub] Client connected.");
        relay.push("plain");
        let drained = relay.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].value, "[hub] Client connected.");
        assert!(drained[0].timestamp_ms <= drained[1].timestamp_ms);
        assert!(relay.is_empty());
    }

    #[test]
    fn test_layer_captures_crate_events() {
        let relay = LogRelay::new();
        let subscriber = tracing_subscriber::registry().with(RelayLayer::new(relay.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("[hub] Listening on {}", 4387);
            tracing::debug!("[hub] too chatty");
            tracing::info!(target: "other_crate", "not ours");
        });
        let drained = relay.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value, "[hub] Listening on 4387");
    }

    #[tokio::test]
    async fn test_flush_posts_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(APPEND_LOGS_PATH))
            .and(header("authorization", "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let relay = LogRelay::new();
        relay.push("one");
        relay.push("two");
        let collector = Collector::new(
            &server.uri(),
            Some("secret".to_string()),
            Duration::from_secs(1),
        );
        assert_eq!(relay.flush(&collector).await, 2);
        assert!(relay.is_empty());

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["logs"][0]["value"], "one");
        assert!(body["logs"][1]["timestampMs"].is_i64());
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_batch() {
        let relay = LogRelay::new();
        relay.push("lost");
        let collector = Collector::new("http://127.0.0.1:9", None, Duration::from_millis(200));
        assert_eq!(relay.flush(&collector).await, 0);
        assert!(relay.is_empty());
    }
}
