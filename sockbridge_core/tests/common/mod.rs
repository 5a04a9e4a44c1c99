#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sockbridge_core::dispatch::{ModalPresenter, Notifier, ProgressDisplay};
use sockbridge_core::{
    CallbackRegistry, Collaborators, Connection, Dispatcher, Envelope, Severity, protocol,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

pub type ServerSide = WebSocketStream<DuplexStream>;

#[derive(Debug, Clone, PartialEq)]
pub enum UiCall {
    Show(String),
    Hide,
    Progress(u8),
    Confirm(Value),
    Showcase(String),
    Notify(Severity, String),
}

/// Records every collaborator call. Confirms every modal.
#[derive(Default)]
pub struct RecordingUi {
    pub calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub fn calls(&self) -> Vec<UiCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: UiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ProgressDisplay for RecordingUi {
    fn show(&self, label: &str) {
        self.push(UiCall::Show(label.to_string()));
    }
    fn hide(&self) {
        self.push(UiCall::Hide);
    }
    fn set_progress(&self, percent: u8) {
        self.push(UiCall::Progress(percent));
    }
}

impl ModalPresenter for RecordingUi {
    fn confirm(&self, content: &Value, on_confirm: Box<dyn FnOnce() + Send>) {
        self.push(UiCall::Confirm(content.clone()));
        on_confirm();
    }
    fn showcase(&self, content: &str) {
        self.push(UiCall::Showcase(content.to_string()));
    }
}

impl Notifier for RecordingUi {
    fn notify(&self, severity: Severity, message: &str, _duration_ms: Option<u64>) {
        self.push(UiCall::Notify(severity, message.to_string()));
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn recording_dispatcher() -> (Dispatcher, Arc<RecordingUi>) {
    let ui = Arc::new(RecordingUi::default());
    let dispatcher = Dispatcher::new(Collaborators::from_ui(ui.clone()), CallbackRegistry::new());
    (dispatcher, ui)
}

/// In-memory WebSocket pair: an open client `Connection` and the raw
/// server end
pub async fn connected(dispatcher: Dispatcher) -> (Arc<Connection>, ServerSide) {
    let (client_io, server_io) = tokio::io::duplex(1 << 20);
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;

    let conn = Connection::new(dispatcher);
    conn.attach(client);
    (conn, server)
}

/// Next decodable envelope the client sent
pub async fn recv_envelope(server: &mut ServerSide) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match server.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(envelope) = protocol::decode(&text) {
                        return envelope;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("server stream ended: {:?}", other),
            }
        }
    })
    .await
    .expect("Timeout waiting for client frame")
}

/// Envelopes up to and including the first one of type `last`
pub async fn recv_until(server: &mut ServerSide, last: &str) -> Vec<Envelope> {
    let mut out = Vec::new();
    loop {
        let envelope = recv_envelope(server).await;
        let done = envelope.kind == last;
        out.push(envelope);
        if done {
            return out;
        }
    }
}

pub async fn send_raw(server: &mut ServerSide, text: &str) {
    server
        .send(Message::Text(text.to_string().into()))
        .await
        .expect("server send failed");
}

pub async fn send_envelope(server: &mut ServerSide, kind: &str, data: Value) {
    let text = protocol::encode(kind, &data).unwrap();
    send_raw(server, &text).await;
}

/// Poll `cond` until it holds or a second passes
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
