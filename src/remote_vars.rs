//! Resolve remote variable references in test data.
//!
//! A value of the form `@@remote_variable@@<url>` is replaced by the `value`
//! field of the JSON document served at `<url>`.

use futures::future::join_all;
use serde_json::{Map, Value};
use std::time::Duration;

pub const REMOTE_PREFIX: &str = "@@remote_variable@@";

/// Resolves `@@remote_variable@@` references over HTTP.
pub struct RemoteVariables {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteVariables {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Resolve every top-level reference concurrently. Values that fail to
    /// resolve are kept as they were.
    pub async fn resolve(&self, input: Map<String, Value>) -> Map<String, Value> {
        let resolved = join_all(input.into_iter().map(|(key, value)| async move {
            let url = value
                .as_str()
                .and_then(|s| s.strip_prefix(REMOTE_PREFIX))
                .map(|url| url.trim().to_string());
            let value = match url {
                Some(url) => self.fetch(&url).await.unwrap_or(value),
                None => value,
            };
            (key, value)
        }))
        .await;
        resolved.into_iter().collect()
    }

    async fn fetch(&self, url: &str) -> Option<Value> {
        let resp = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!("[hub] Remote variable {} unavailable: {}", url, e);
                return None;
            }
        };
        let body: Value = resp.json().await.ok()?;
        let value = body.as_object()?.get("value")?.clone();
        Some(match value {
            // String values may themselves carry JSON
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        })
    }
}

/// The generated module the app imports its test data from.
pub fn render_test_data(data: &Map<String, Value>) -> String {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    format!(
        "export const testData: {{ [index: string]: any }} = {};\n",
        json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_resolves_remote_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "hello"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nested"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": "{\"n\": [1, 2]}"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing-value"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"other": 1})))
            .mount(&server)
            .await;

        let input = map(json!({
            "plain": format!("{}{}/plain", REMOTE_PREFIX, server.uri()),
            "nested": format!("{} {}/nested ", REMOTE_PREFIX, server.uri()),
            "missing": format!("{}{}/missing-value", REMOTE_PREFIX, server.uri()),
            "literal": "stays",
            "number": 3,
        }));

        let resolved = RemoteVariables::new(Duration::from_secs(2))
            .resolve(input.clone())
            .await;

        assert_eq!(resolved["plain"], json!("hello"));
        assert_eq!(resolved["nested"], json!({"n": [1, 2]}));
        assert_eq!(resolved["missing"], input["missing"]);
        assert_eq!(resolved["literal"], json!("stays"));
        assert_eq!(resolved["number"], json!(3));
    }

    #[tokio::test]
    async fn test_unreachable_keeps_original() {
        let input = map(json!({
            "x": format!("{}http://127.0.0.1:9/unreachable", REMOTE_PREFIX),
        }));
        let resolved = RemoteVariables::new(Duration::from_millis(200))
            .resolve(input.clone())
            .await;
        assert_eq!(resolved, input);
    }

    #[test]
    fn test_render_test_data() {
        let rendered = render_test_data(&map(json!({"a": 1})));
        assert_eq!(
            rendered,
            "export const testData: { [index: string]: any } = {\n  \"a\": 1\n};\n"
        );
    }
}
