//! Interfaces of the user-facing collaborators driven by the transport

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Loading screen with an optional progress bar
pub trait ProgressDisplay: Send + Sync {
    fn show(&self, label: &str);
    fn hide(&self);
    /// Percent complete, 0..=100
    fn set_progress(&self, percent: u8);
}

/// Modal dialogs
pub trait ModalPresenter: Send + Sync {
    /// Ask the user to confirm `content`; run `on_confirm` if they do
    fn confirm(&self, content: &Value, on_confirm: Box<dyn FnOnce() + Send>);
    /// Persistent, non-dismissable message (used when the connection dies)
    fn showcase(&self, content: &str);
}

/// Transient notifications (toasts)
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str, duration_ms: Option<u64>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl FromStr for Severity {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to `Info`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "warning" | "warn" => Self::Warning,
            "error" | "danger" => Self::Error,
            _ => Self::Info,
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Collaborator that only logs. Confirmations are never accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl ProgressDisplay for Headless {
    fn show(&self, label: &str) {
        tracing::debug!("[progress] show: {}", label);
    }

    fn hide(&self) {
        tracing::debug!("[progress] hide");
    }

    fn set_progress(&self, percent: u8) {
        tracing::debug!("[progress] {}%", percent);
    }
}

impl ModalPresenter for Headless {
    fn confirm(&self, content: &Value, _on_confirm: Box<dyn FnOnce() + Send>) {
        tracing::info!("[modal] confirmation requested: {}", content);
    }

    fn showcase(&self, content: &str) {
        tracing::warn!("[modal] {}", content);
    }
}

impl Notifier for Headless {
    fn notify(&self, severity: Severity, message: &str, _duration_ms: Option<u64>) {
        tracing::info!("[{}] {}", severity, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing_is_lenient() {
        assert_eq!("success".parse::<Severity>().unwrap(), Severity::Success);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("whatever".parse::<Severity>().unwrap(), Severity::Info);
    }
}
