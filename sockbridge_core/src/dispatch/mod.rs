//! Inbound dispatcher
//!
//! Routes UI-facing envelope types (`pop-up`, `toast`, `error`,
//! `notification`) to their collaborators. Every other type passes through
//! untouched; the connection still hands it to the correlator and observers.

mod callbacks;
mod ui;

pub use callbacks::CallbackRegistry;
pub use ui::{Headless, ModalPresenter, Notifier, ProgressDisplay, Severity};

use crate::protocol::messages::{ErrorReport, Notification, PopUp, Toast, value_to_text};
use crate::protocol::{ERROR, Envelope, NOTIFICATION, POP_UP, TOAST};
use std::collections::HashMap;
use std::sync::Arc;

/// Shown when the socket closes. The user has to restart the backend and
/// reload to recover.
pub const DISCONNECTED_MESSAGE: &str = "Server socket closed, please refresh to reconnect. \
     Make sure the backend server is running.";

type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// The UI collaborators a connection drives
#[derive(Clone)]
pub struct Collaborators {
    pub progress: Arc<dyn ProgressDisplay>,
    pub modal: Arc<dyn ModalPresenter>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Log-only collaborators
    pub fn headless() -> Self {
        Self::from_ui(Arc::new(Headless))
    }

    /// Use one object for all three roles
    pub fn from_ui<T>(ui: Arc<T>) -> Self
    where
        T: ProgressDisplay + ModalPresenter + Notifier + 'static,
    {
        Self {
            progress: ui.clone(),
            modal: ui.clone(),
            notifier: ui,
        }
    }
}

/// Routing table from envelope type to handler
#[derive(Clone)]
pub struct Dispatcher {
    ui: Collaborators,
    routes: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new(ui: Collaborators, callbacks: CallbackRegistry) -> Self {
        let mut dispatcher = Self {
            ui,
            routes: HashMap::new(),
        };
        dispatcher.install_builtin_routes(Arc::new(callbacks));
        dispatcher
    }

    pub fn headless() -> Self {
        Self::new(Collaborators::headless(), CallbackRegistry::new())
    }

    pub fn ui(&self) -> &Collaborators {
        &self.ui
    }

    /// Add or replace the handler for `kind`
    pub fn route<F>(&mut self, kind: &str, handler: F) -> &mut Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.routes.insert(kind.to_string(), Arc::new(handler));
        self
    }

    /// Run the handler registered for the envelope's type, if any.
    /// Returns true when a handler ran.
    pub fn dispatch(&self, envelope: &Envelope) -> bool {
        match self.routes.get(&envelope.kind) {
            Some(handler) => {
                handler(envelope);
                true
            }
            None => false,
        }
    }

    /// Terminal notice that the connection is gone
    pub fn disconnected(&self) {
        self.ui.progress.hide();
        self.ui.modal.showcase(DISCONNECTED_MESSAGE);
    }

    fn install_builtin_routes(&mut self, callbacks: Arc<CallbackRegistry>) {
        // 1. pop-up: confirmation modal, optional named callback on confirm
        let modal = self.ui.modal.clone();
        let notifier = self.ui.notifier.clone();
        self.route(POP_UP, move |envelope| {
            let popup: PopUp = match envelope.payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Ignoring malformed pop-up: {}", e);
                    return;
                }
            };
            tracing::debug!("pop-up: {}", popup.content);

            let callbacks = callbacks.clone();
            let notifier = notifier.clone();
            let callback = popup.callback;
            modal.confirm(
                &popup.content,
                Box::new(move || {
                    let Some(name) = callback else { return };
                    if let Err(e) = callbacks.invoke(&name) {
                        tracing::error!("pop-up callback failed: {}", e);
                        notifier.notify(Severity::Error, &e.to_string(), None);
                    }
                }),
            );
        });

        // 2. toast
        let notifier = self.ui.notifier.clone();
        self.route(TOAST, move |envelope| match envelope.payload::<Toast>() {
            Ok(toast) => {
                let severity = toast
                    .severity
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(Severity::Success);
                notifier.notify(severity, &value_to_text(&toast.content), toast.duration);
            }
            Err(e) => tracing::warn!("Ignoring malformed toast: {}", e),
        });

        // 3. error
        let notifier = self.ui.notifier.clone();
        self.route(ERROR, move |envelope| {
            let text = match &envelope.data {
                serde_json::Value::String(s) => s.clone(),
                _ => envelope.payload::<ErrorReport>().unwrap_or_default().text(),
            };
            tracing::warn!("Backend error: {}", text);
            notifier.notify(Severity::Error, &text, None);
        });

        // 4. notification
        let notifier = self.ui.notifier.clone();
        self.route(NOTIFICATION, move |envelope| {
            match envelope.payload::<Notification>() {
                Ok(n) => notifier.notify(Severity::Info, &value_to_text(&n.content), None),
                Err(e) => tracing::warn!("Ignoring malformed notification: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        notes: Mutex<Vec<(Severity, String, Option<u64>)>>,
        confirms: Mutex<Vec<Value>>,
        showcases: Mutex<Vec<String>>,
        accept: bool,
    }

    impl ProgressDisplay for Recorder {
        fn show(&self, _label: &str) {}
        fn hide(&self) {}
        fn set_progress(&self, _percent: u8) {}
    }

    impl ModalPresenter for Recorder {
        fn confirm(&self, content: &Value, on_confirm: Box<dyn FnOnce() + Send>) {
            self.confirms.lock().unwrap().push(content.clone());
            if self.accept {
                on_confirm();
            }
        }
        fn showcase(&self, content: &str) {
            self.showcases.lock().unwrap().push(content.to_string());
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, severity: Severity, message: &str, duration_ms: Option<u64>) {
            self.notes
                .lock()
                .unwrap()
                .push((severity, message.to_string(), duration_ms));
        }
    }

    fn env(kind: &str, data: Value) -> Envelope {
        Envelope::new(kind, &data).unwrap()
    }

    #[test]
    fn test_toast_routes_to_notifier() {
        let ui = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());

        assert!(dispatcher.dispatch(&env(TOAST, json!({"type": "error", "content": "nope"}))));
        let notes = ui.notes.lock().unwrap();
        assert_eq!(notes.as_slice(), &[(Severity::Error, "nope".to_string(), None)]);
    }

    #[test]
    fn test_error_routes_to_notifier() {
        let ui = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());

        assert!(dispatcher.dispatch(&env(ERROR, json!({"message": "bad request"}))));
        assert_eq!(ui.notes.lock().unwrap()[0].1, "bad request");
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let ui = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());

        assert!(!dispatcher.dispatch(&env("files_listed", json!([1, 2]))));
        assert!(ui.notes.lock().unwrap().is_empty());
        assert!(ui.confirms.lock().unwrap().is_empty());
    }

    #[test]
    fn test_popup_invokes_named_callback_on_confirm() {
        let ui = Arc::new(Recorder {
            accept: true,
            ..Default::default()
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut callbacks = CallbackRegistry::new();
        callbacks.register("reload_files", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let dispatcher = Dispatcher::new(Collaborators::from_ui(ui.clone()), callbacks);

        dispatcher.dispatch(&env(
            POP_UP,
            json!({"content": "Reload?", "callback": "reload_files"}),
        ));

        assert_eq!(ui.confirms.lock().unwrap().as_slice(), &[json!("Reload?")]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_popup_unknown_callback_is_reported() {
        let ui = Arc::new(Recorder {
            accept: true,
            ..Default::default()
        });
        let dispatcher =
            Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());

        dispatcher.dispatch(&env(POP_UP, json!({"content": "x", "callback": "missing"})));

        let notes = ui.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, Severity::Error);
        assert!(notes[0].1.contains("missing"));
    }

    #[test]
    fn test_custom_route() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut dispatcher = Dispatcher::headless();
        dispatcher.route("refresh", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(dispatcher.dispatch(&Envelope::bare("refresh")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnected_shows_persistent_modal() {
        let ui = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());
        dispatcher.disconnected();
        assert_eq!(
            ui.showcases.lock().unwrap().as_slice(),
            &[DISCONNECTED_MESSAGE.to_string()]
        );
    }
}
