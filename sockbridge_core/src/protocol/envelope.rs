//! `{type, data}` envelope and its text codec

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single unit exchanged over the connection.
///
/// `kind` selects the handling path on both sides; `data` is opaque to the
/// transport and defaults to `null` when the peer omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from any serializable payload
    pub fn new<T: Serialize + ?Sized>(kind: &str, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Envelope with a `null` payload
    pub fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: Value::Null,
        }
    }

    /// Serialize to the wire text form
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `data.content` if present and not null
    pub fn content(&self) -> Option<&Value> {
        self.data.get("content").filter(|v| !v.is_null())
    }

    /// Decode `data` into a typed payload
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Encode a `{type, data}` pair into its canonical text form
pub fn encode<T: Serialize + ?Sized>(kind: &str, data: &T) -> Result<String, serde_json::Error> {
    Envelope::new(kind, data)?.to_text()
}

/// Decode an inbound text frame.
///
/// Returns `None` for anything that is not a JSON object with a string
/// `type` field. Never panics; the failure is logged and the frame dropped.
pub fn decode(raw: &str) -> Option<Envelope> {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            let preview: String = raw.chars().take(80).collect();
            tracing::warn!("Dropping malformed envelope ({}): {}", e, preview);
            None
        }
    }
}
