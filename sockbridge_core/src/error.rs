use std::time::Duration;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Failure of a correlated wait
#[derive(Debug, Error)]
pub enum ReplyError {
    /// No envelope of the expected type arrived before the deadline
    #[error("Timed out after {after:?} waiting for '{kind}'")]
    Timeout { kind: String, after: Duration },
    /// The connection was dropped while the wait was pending
    #[error("Connection dropped while waiting for '{0}'")]
    Disconnected(String),
    /// The request itself could not be queued
    #[error("'{kind}' was not sent (connection {state})")]
    NotSent { kind: String, state: ConnectionState },
}

/// Failure of a chunked upload session. Any of these leaves the session
/// without its `end_chunked_upload` terminator.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Chunk size must be at least 1 byte")]
    InvalidChunkSize,
    #[error("Failed to read chunk {index}: {source}")]
    Read {
        index: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open upload source: {0}")]
    Open(#[from] std::io::Error),
    #[error("Connection is {0}, upload aborted")]
    NotOpen(ConnectionState),
    #[error("Upload cancelled")]
    Cancelled,
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Named callback lookup failure
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Unknown callback '{0}'")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid server URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Server URL must use ws:// or wss://, got '{0}://'")]
    Scheme(String),
}
