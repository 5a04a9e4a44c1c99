//! Chunked upload engine
//!
//! One call = one session:
//!
//! ```text
//! start_chunked_upload {upload_id, folder, filename, total_chunks}
//! chunk {upload_id, chunk_index: 0, bin64}
//! ...
//! chunk {upload_id, chunk_index: total_chunks - 1, bin64}
//! end_chunked_upload {upload_id}
//! ```
//!
//! Chunk `n + 1` is read only after chunk `n` has been queued, and the task
//! yields to the scheduler between chunks. Any failure stops the session
//! before `end_chunked_upload`; the backend treats an unterminated session
//! as aborted.

use super::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_UPLOAD_LABEL};
use super::source::{ChunkSource, FileSource};
use super::utils::{next_upload_id, progress_percent, sanitize_file_name, total_chunks};
use crate::connection::Connection;
use crate::dispatch::ProgressDisplay;
use crate::error::UploadError;
use crate::protocol::{
    CHUNK, ChunkData, END_CHUNKED_UPLOAD, EndChunkedUpload, Envelope, START_CHUNKED_UPLOAD,
    StartChunkedUpload,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Destination folder on the backend, one entry per path segment.
    /// Empty means the root.
    pub folder: Vec<String>,
    pub chunk_size: usize,
    /// Loading-screen text; defaults to "Uploading..."
    pub label: Option<String>,
    /// Drive the progress display while uploading
    pub show_progress: bool,
    /// Stop the session (without `end_chunked_upload`) when cancelled
    pub cancel: Option<CancellationToken>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            folder: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            label: None,
            show_progress: true,
            cancel: None,
        }
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub upload_id: String,
    pub filename: String,
    pub total_chunks: u64,
    pub bytes_sent: u64,
}

/// Hides the loading screen however the session ends
struct ProgressGuard<'a> {
    display: Option<&'a dyn ProgressDisplay>,
}

impl<'a> ProgressGuard<'a> {
    fn start(display: &'a dyn ProgressDisplay, enabled: bool, label: &str) -> Self {
        if !enabled {
            return Self { display: None };
        }
        display.show(label);
        display.set_progress(0);
        Self {
            display: Some(display),
        }
    }

    fn update(&self, percent: u8) {
        if let Some(display) = self.display {
            display.set_progress(percent);
        }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        if let Some(display) = self.display {
            display.hide();
        }
    }
}

/// Upload the file at `path` under its own file name
pub async fn upload_file(
    conn: &Connection,
    path: &Path,
    options: &UploadOptions,
) -> Result<UploadSummary, UploadError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown_file.bin".to_string());
    let mut source = FileSource::open(path).await?;
    upload(conn, &mut source, &file_name, options).await
}

/// Run one chunked upload session over `conn`
pub async fn upload<S: ChunkSource>(
    conn: &Connection,
    source: &mut S,
    file_name: &str,
    options: &UploadOptions,
) -> Result<UploadSummary, UploadError> {
    if options.chunk_size == 0 {
        return Err(UploadError::InvalidChunkSize);
    }
    let chunk_size = options.chunk_size as u64;

    // 1. Session parameters
    let file_size = source.size();
    let total = total_chunks(file_size, chunk_size);
    let upload_id = next_upload_id();
    let filename = sanitize_file_name(file_name);

    tracing::info!(
        "Upload {}: '{}' ({} bytes, {} chunks of {})",
        upload_id,
        filename,
        file_size,
        total,
        chunk_size
    );

    let label = options.label.as_deref().unwrap_or(DEFAULT_UPLOAD_LABEL);
    let progress = ProgressGuard::start(conn.ui().progress.as_ref(), options.show_progress, label);

    // 2. start
    let start = Envelope::new(
        START_CHUNKED_UPLOAD,
        &StartChunkedUpload {
            upload_id: upload_id.clone(),
            folder: options.folder.clone(),
            filename: filename.clone(),
            total_chunks: total,
        },
    )?;
    send_or_abort(conn, &start)?;

    // 3. chunks, strictly in order
    let mut bytes_sent = 0u64;
    for index in 0..total {
        if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            tracing::warn!("Upload {} cancelled at chunk {}/{}", upload_id, index, total);
            return Err(UploadError::Cancelled);
        }

        let bytes = source
            .read_chunk(index * chunk_size, options.chunk_size)
            .await
            .map_err(|e| {
                tracing::error!("Upload {} failed reading chunk {}: {}", upload_id, index, e);
                UploadError::Read { index, source: e }
            })?;

        let chunk = Envelope::new(
            CHUNK,
            &ChunkData {
                upload_id: upload_id.clone(),
                chunk_index: index,
                bin64: BASE64.encode(&bytes),
            },
        )?;
        send_or_abort(conn, &chunk)?;
        bytes_sent += bytes.len() as u64;

        tracing::debug!("Upload {}: chunk {}/{} queued", upload_id, index + 1, total);
        progress.update(progress_percent(index + 1, total));

        // Let other tasks run between chunks
        tokio::task::yield_now().await;
    }

    // 4. end
    let end = Envelope::new(
        END_CHUNKED_UPLOAD,
        &EndChunkedUpload {
            upload_id: upload_id.clone(),
        },
    )?;
    send_or_abort(conn, &end)?;

    tracing::info!("Upload {} complete ({} bytes)", upload_id, bytes_sent);
    Ok(UploadSummary {
        upload_id,
        filename,
        total_chunks: total,
        bytes_sent,
    })
}

fn send_or_abort(conn: &Connection, envelope: &Envelope) -> Result<(), UploadError> {
    if conn.send(envelope) {
        Ok(())
    } else {
        Err(UploadError::NotOpen(conn.state()))
    }
}
