use super::constants::SEPARATOR_REPLACEMENT;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Replace every path separator (`/` and `\`) so the backend cannot read
/// the name as a path
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| match c {
            '/' | '\\' => SEPARATOR_REPLACEMENT,
            other => other,
        })
        .collect()
}

/// `ceil(file_size / chunk_size)`; `chunk_size` must be non-zero
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Percent complete after `done` of `total` chunks, rounded
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

static LAST_UPLOAD_ID: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp, bumped past the previous id so two uploads started
/// in the same millisecond still get distinct ids
pub fn next_upload_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut previous = LAST_UPLOAD_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(previous + 1);
        match LAST_UPLOAD_ID.compare_exchange_weak(
            previous,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => previous = actual,
        }
    }
}
