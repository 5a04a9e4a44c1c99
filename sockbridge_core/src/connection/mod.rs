//! Transport connection
//!
//! One `Connection` owns the single WebSocket to the backend. Every sender,
//! uploader and reply waiter shares it through an `Arc`.
//!
//! ## Data Flow
//!
//! ```text
//! send() ──► outbound queue ──► [writer task] ──► socket
//! socket ──► [reader task] ──► decode ──► dispatcher
//!                                    ├──► correlator (pending waits)
//!                                    └──► observers (broadcast)
//! ```
//!
//! All writes go through one unbounded queue drained by one task, so frames
//! leave in the order `send` was called.

mod correlator;
mod state;

pub use correlator::{Correlator, WaitOptions};
pub use state::{ConnectionState, ReadySignal, StateCell};

use crate::dispatch::{Collaborators, Dispatcher};
use crate::error::ReplyError;
use crate::protocol::{self, Envelope};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};

/// Buffered envelopes per observer before a slow observer starts lagging
const OBSERVER_CAPACITY: usize = 256;

enum Outbound {
    Text(String),
    Close,
}

pub struct Connection {
    state: StateCell,
    opened: ReadySignal,
    outbound: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    observers: broadcast::Sender<Envelope>,
    correlator: Correlator,
    dispatcher: Dispatcher,
    last_message: Mutex<Option<Envelope>>,
    /// A loading screen is up until the next inbound envelope
    awaiting_response: AtomicBool,
    /// This side asked for the close, so it is not reported as a disconnect
    close_requested: AtomicBool,
}

impl Connection {
    /// New connection in the `Connecting` state. Nothing flows until a
    /// socket is attached.
    pub fn new(dispatcher: Dispatcher) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Arc::new(Self {
            state: StateCell::new(),
            opened: ReadySignal::new(),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            observers,
            correlator: Correlator::new(),
            dispatcher,
            last_message: Mutex::new(None),
            awaiting_response: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
        })
    }

    /// Dial `url` in the background and return immediately.
    ///
    /// A failed dial closes the connection exactly like a dropped socket.
    pub fn connect(url: &str, dispatcher: Dispatcher) -> Arc<Self> {
        let conn = Self::new(dispatcher);
        let task_conn = conn.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            tracing::info!("Connecting to {}", url);
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    tracing::info!("Connected to {}", url);
                    task_conn.run(ws).await;
                }
                Err(e) => {
                    tracing::error!("Connection to {} failed: {}", url, e);
                    task_conn.shutdown();
                }
            }
        });
        conn
    }

    /// Attach an already-established WebSocket. The connection is `Open`
    /// when this returns; the returned task ends when the socket closes.
    pub fn attach<S>(self: &Arc<Self>, ws: WebSocketStream<S>) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.mark_open();
        let conn = self.clone();
        tokio::spawn(async move { conn.run(ws).await })
    }

    async fn run<S>(self: Arc<Self>, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Some(mut outbound_rx) = self.take_outbound() else {
            tracing::warn!("Connection already has a socket attached, ignoring the new one");
            return;
        };
        self.mark_open();

        let (mut sink, mut stream) = ws.split();

        // ── Writer ──
        let writer = tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                let frame = match item {
                    Outbound::Text(text) => Message::Text(text.into()),
                    Outbound::Close => Message::Close(None),
                };
                if let Err(e) = sink.send(frame).await {
                    tracing::error!("WebSocket write failed: {}", e);
                    break;
                }
            }
        });

        // ── Reader ──
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&text),
                Ok(Message::Close(reason)) => {
                    tracing::info!("Socket closed by peer: {:?}", reason);
                    break;
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring {} byte binary frame", data.len());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            }
        }

        writer.abort();
        self.shutdown();
    }

    fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        self.outbound_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn mark_open(&self) {
        if self.state.advance(ConnectionState::Open) {
            tracing::info!("Connection open");
            self.opened.fire();
        }
    }

    fn shutdown(&self) {
        if !self.state.advance(ConnectionState::Closed) {
            return;
        }
        // Nothing can satisfy these any more
        self.correlator.close();
        self.awaiting_response.store(false, Ordering::SeqCst);

        if self.close_requested.load(Ordering::SeqCst) {
            tracing::info!("Connection closed");
            self.dispatcher.ui().progress.hide();
        } else {
            tracing::warn!("Disconnected from server");
            self.dispatcher.disconnected();
        }
    }

    fn handle_frame(&self, raw: &str) {
        let Some(envelope) = protocol::decode(raw) else {
            return;
        };
        tracing::debug!("Received '{}'", envelope.kind);

        if self.awaiting_response.swap(false, Ordering::SeqCst) {
            self.dispatcher.ui().progress.hide();
        }

        self.dispatcher.dispatch(&envelope);
        self.correlator.resolve(&envelope);

        *self
            .last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(envelope.clone());

        // No observers is fine
        let _ = self.observers.send(envelope);
    }

    // ── Lifecycle ───────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Resolve once the connection has opened. Completes at once if it
    /// already did. If the connection closes without ever opening this
    /// never completes.
    pub async fn ready(&self) {
        self.opened.wait().await
    }

    /// Resolve once the connection is closed
    pub async fn closed(&self) {
        self.state.reached(ConnectionState::Closed).await
    }

    /// Ask the peer to close the socket. A close requested here ends the
    /// connection quietly, without the disconnect notice.
    pub fn close(&self) {
        if self.is_open() {
            self.close_requested.store(true, Ordering::SeqCst);
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    // ── Outbound ────────────────────────────────────────────────

    /// Queue an envelope. Returns false, and sends nothing, when the
    /// connection is not open.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let state = self.state();
        if state != ConnectionState::Open {
            tracing::warn!("Dropping '{}': connection is {}", envelope.kind, state);
            return false;
        }
        let text = match envelope.to_text() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Failed to encode '{}': {}", envelope.kind, e);
                return false;
            }
        };
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Send a command with a serializable payload
    pub fn send_message<T: Serialize + ?Sized>(&self, kind: &str, data: &T) -> bool {
        match Envelope::new(kind, data) {
            Ok(envelope) => self.send(&envelope),
            Err(e) => {
                tracing::error!("Failed to encode '{}': {}", kind, e);
                false
            }
        }
    }

    /// Send a command and put up the loading screen with `label` until the
    /// next inbound envelope arrives
    pub fn send_waiting<T: Serialize + ?Sized>(&self, kind: &str, data: &T, label: &str) -> bool {
        self.dispatcher.ui().progress.show(label);
        self.awaiting_response.store(true, Ordering::SeqCst);
        self.send_message(kind, data)
    }

    // ── Inbound ─────────────────────────────────────────────────

    /// Wait for the next envelope of type `kind` arriving after this call
    pub fn wait_for(
        &self,
        kind: &str,
        options: WaitOptions,
    ) -> impl Future<Output = Result<Value, ReplyError>> + Send + 'static {
        self.correlator.wait_for(kind, options)
    }

    /// Send a command and wait for its reply. The wait is registered before
    /// the command leaves, so a fast reply cannot be missed.
    ///
    /// Fails at once if the command could not be sent.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        kind: &str,
        data: &T,
        reply_kind: &str,
        options: WaitOptions,
    ) -> Result<Value, ReplyError> {
        let reply = self.wait_for(reply_kind, options);
        if !self.send_message(kind, data) {
            return Err(match self.state() {
                ConnectionState::Closed => ReplyError::Disconnected(reply_kind.to_string()),
                state => ReplyError::NotSent {
                    kind: kind.to_string(),
                    state,
                },
            });
        }
        reply.await
    }

    /// Every decoded inbound envelope, in arrival order
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.observers.subscribe()
    }

    pub fn last_message(&self) -> Option<Envelope> {
        self.last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn pending_waits(&self) -> usize {
        self.correlator.pending()
    }

    pub fn ui(&self) -> &Collaborators {
        self.dispatcher.ui()
    }
}
