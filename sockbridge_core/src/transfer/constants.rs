/// Default chunk size for uploads (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Progress label when the caller gives none
pub const DEFAULT_UPLOAD_LABEL: &str = "Uploading...";

/// Replacement for path separators in uploaded file names
pub const SEPARATOR_REPLACEMENT: char = '_';
