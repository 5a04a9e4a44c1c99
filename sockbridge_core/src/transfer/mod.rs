//! Chunked file upload over the shared connection.
//!
//! This module provides:
//! - Byte sources (files on disk, in-memory buffers)
//! - The start / chunk / end session protocol
//! - File name sanitization and upload id generation

pub mod constants;
pub mod source;
pub mod upload;
pub mod utils;

// Re-export public API
pub use constants::DEFAULT_CHUNK_SIZE;
pub use source::{ChunkSource, FileSource, MemorySource};
pub use upload::{UploadOptions, UploadSummary, upload, upload_file};
pub use utils::{next_upload_id, sanitize_file_name, total_chunks};
