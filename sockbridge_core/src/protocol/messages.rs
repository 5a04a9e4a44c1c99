//! Envelope type names and payload shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opens a chunked upload session
pub const START_CHUNKED_UPLOAD: &str = "start_chunked_upload";
/// One encoded slice of an upload session
pub const CHUNK: &str = "chunk";
/// Closes a chunked upload session
pub const END_CHUNKED_UPLOAD: &str = "end_chunked_upload";

/// Backend asks for a modal confirmation
pub const POP_UP: &str = "pop-up";
/// Backend asks for a transient notification
pub const TOAST: &str = "toast";
/// Backend reports an error
pub const ERROR: &str = "error";
/// Backend sends a plain informational notice
pub const NOTIFICATION: &str = "notification";

// ── Outbound ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartChunkedUpload {
    pub upload_id: String,
    pub folder: Vec<String>,
    pub filename: String,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    pub upload_id: String,
    pub chunk_index: u64,
    /// Base64 of the raw chunk bytes
    pub bin64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndChunkedUpload {
    pub upload_id: String,
}

// ── Inbound ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PopUp {
    #[serde(default)]
    pub content: Value,
    /// Name of a registered callback to run when the user confirms
    #[serde(default)]
    pub callback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Toast {
    /// Severity name ("success", "error", "info", ...)
    #[serde(rename = "type", default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub content: Value,
    /// Display duration in milliseconds
    #[serde(default)]
    pub duration: Option<u64>,
}

/// `error` payload. Older backends put the text under `content`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorReport {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl ErrorReport {
    pub fn text(&self) -> String {
        self.message
            .as_ref()
            .or(self.content.as_ref())
            .map(value_to_text)
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub content: Value,
}

/// Render a payload value for a human: strings verbatim, everything else as JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
