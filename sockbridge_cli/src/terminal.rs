//! Terminal stand-ins for the loading screen, modals and toasts

use serde_json::Value;
use sockbridge_core::Severity;
use sockbridge_core::dispatch::{ModalPresenter, Notifier, ProgressDisplay};
use std::io::Write;
use std::sync::Mutex;

pub struct TerminalUi {
    /// Accept every confirmation request without asking
    assume_yes: bool,
    label: Mutex<String>,
}

impl TerminalUi {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            label: Mutex::new(String::new()),
        }
    }
}

impl ProgressDisplay for TerminalUi {
    fn show(&self, label: &str) {
        if let Ok(mut current) = self.label.lock() {
            *current = label.to_string();
        }
        eprintln!("{}", label);
    }

    fn hide(&self) {
        if let Ok(mut current) = self.label.lock() {
            if !current.is_empty() {
                eprintln!();
                current.clear();
            }
        }
    }

    fn set_progress(&self, percent: u8) {
        let filled = usize::from(percent) / 5;
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(20 - filled.min(20)));
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r[{}] {:>3}%", bar, percent);
        let _ = stderr.flush();
    }
}

impl ModalPresenter for TerminalUi {
    fn confirm(&self, content: &Value, on_confirm: Box<dyn FnOnce() + Send>) {
        let text = match content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if self.assume_yes {
            eprintln!("? {} [auto-confirmed]", text);
            on_confirm();
        } else {
            eprintln!("? {} [declined, pass --yes to accept]", text);
        }
    }

    fn showcase(&self, content: &str) {
        eprintln!("!! {}", content);
    }
}

impl Notifier for TerminalUi {
    fn notify(&self, severity: Severity, message: &str, _duration_ms: Option<u64>) {
        match severity {
            Severity::Error => tracing::error!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Success | Severity::Info => tracing::info!("{}", message),
        }
    }
}
