//! WebSocket protocol message types and encoding/decoding.
//!
//! Messages are JSON text frames with a required `event` discriminator:
//! - `sync`: with no payload it is the agent's request for full state; with
//!   `files` (or the legacy `code`) it is the hub's response
//! - `patch`: one file's full content, either direction
//! - `updateTestData`: key/value payload materialized as a generated file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Decoded WebSocket message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Agent asks the hub for every editable file
    SyncRequest,
    /// Hub's full state
    SyncResponse {
        files: BTreeMap<String, String>,
        /// Content of the default file, kept for older clients
        code: Option<String>,
        preview_domain: Option<String>,
    },
    /// One file's full content
    Patch(Patch),
    /// Test data to materialize on the hub
    UpdateTestData { test_data: Map<String, Value> },
}

/// A whole-file update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_hmr: Option<bool>,
}

impl Patch {
    pub fn new(filename: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            filename: Some(filename.into()),
            force_hmr: None,
        }
    }

    pub fn with_force_hmr(mut self) -> Self {
        self.force_hmr = Some(true);
        self
    }

    pub fn force_hmr(&self) -> bool {
        self.force_hmr == Some(true)
    }
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("missing event field")]
    MissingEvent,
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid {event} message: {reason}")]
    InvalidField { event: &'static str, reason: String },
    #[error("binary frames are not supported")]
    Binary,
}

#[derive(Serialize)]
#[serde(tag = "event")]
enum Outgoing<'a> {
    #[serde(rename = "sync")]
    SyncRequest,
    #[serde(rename = "sync", rename_all = "camelCase")]
    SyncResponse {
        files: &'a BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        preview_domain: Option<&'a str>,
    },
    #[serde(rename = "patch")]
    Patch(&'a Patch),
    #[serde(rename = "updateTestData", rename_all = "camelCase")]
    UpdateTestData { test_data: &'a Map<String, Value> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncFields {
    #[serde(default)]
    files: Option<BTreeMap<String, String>>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    preview_domain: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestDataFields {
    test_data: Map<String, Value>,
}

impl Message {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> String {
        let outgoing = match self {
            Message::SyncRequest => Outgoing::SyncRequest,
            Message::SyncResponse {
                files,
                code,
                preview_domain,
            } => Outgoing::SyncResponse {
                files,
                code: code.as_deref(),
                preview_domain: preview_domain.as_deref(),
            },
            Message::Patch(patch) => Outgoing::Patch(patch),
            Message::UpdateTestData { test_data } => Outgoing::UpdateTestData { test_data },
        };
        // Maps with string keys and plain values always serialize
        serde_json::to_string(&outgoing).unwrap_or_default()
    }

    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let event = obj
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingEvent)?;

        match event {
            "sync" => {
                if !obj.contains_key("files") && !obj.contains_key("code") {
                    return Ok(Message::SyncRequest);
                }
                let fields: SyncFields =
                    serde_json::from_value(value.clone()).map_err(|e| invalid("sync", e))?;
                Ok(Message::SyncResponse {
                    files: fields.files.unwrap_or_default(),
                    code: fields.code,
                    preview_domain: fields.preview_domain,
                })
            }
            "patch" => {
                let patch: Patch =
                    serde_json::from_value(value.clone()).map_err(|e| invalid("patch", e))?;
                Ok(Message::Patch(patch))
            }
            "updateTestData" => {
                let fields: TestDataFields = serde_json::from_value(value.clone())
                    .map_err(|e| invalid("updateTestData", e))?;
                Ok(Message::UpdateTestData {
                    test_data: fields.test_data,
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn invalid(event: &'static str, err: serde_json::Error) -> ProtocolError {
    ProtocolError::InvalidField {
        event,
        reason: err.to_string(),
    }
}

/// Close code the hub sends when it is shutting down on purpose.
pub const CLOSE_GOING_AWAY: u16 = 1001;
