//! Client-side transport for a backend reached over one WebSocket.
//!
//! - [`connection`]: the shared socket, its lifecycle and reply correlation
//! - [`protocol`]: `{type, data}` envelopes and payload shapes
//! - [`transfer`]: chunked file uploads (start / chunk / end)
//! - [`dispatch`]: routing of UI-facing envelopes to collaborators

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transfer;

pub use config::ClientConfig;
pub use connection::{Connection, ConnectionState, WaitOptions};
pub use dispatch::{CallbackRegistry, Collaborators, Dispatcher, Severity};
pub use error::{CallbackError, ConfigError, ReplyError, UploadError};
pub use protocol::Envelope;
pub use transfer::{UploadOptions, UploadSummary};
