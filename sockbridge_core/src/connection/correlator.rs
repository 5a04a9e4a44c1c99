//! Reply correlation: match inbound envelopes to callers waiting on a type

use crate::error::ReplyError;
use crate::protocol::Envelope;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Options for a correlated wait
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Resolve to `data.content`, then `data`, then the whole envelope,
    /// whichever is present first.
    pub unwrap_content: bool,
}

impl WaitOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            unwrap_content: false,
        }
    }

    pub fn with_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.timeout = ms.map(Duration::from_millis);
        self
    }

    pub fn unwrap_content(mut self) -> Self {
        self.unwrap_content = true;
        self
    }
}

struct PendingWait {
    id: u64,
    expected: String,
    resolver: oneshot::Sender<Envelope>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    waits: Mutex<Vec<PendingWait>>,
    /// Set once the connection is gone. Only read or written under `waits`.
    closed: AtomicBool,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Vec<PendingWait>> {
        // A panic while holding this lock cannot leave the Vec inconsistent
        self.waits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Set of in-flight waits, shared between the connection's reader task and
/// every caller of [`Correlator::wait_for`].
#[derive(Clone, Default)]
pub struct Correlator {
    registry: Arc<Registry>,
}

/// Removes the wait from the registry when the waiting future completes or
/// is dropped, so nothing can resolve it afterwards.
struct Deregister {
    registry: Arc<Registry>,
    id: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.lock().retain(|w| w.id != self.id);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for the next envelope of type `kind`.
    ///
    /// Registration happens before this returns; only envelopes that arrive
    /// afterwards can satisfy the wait. After [`Correlator::close`] nothing
    /// is registered and the wait fails with `Disconnected`.
    pub fn wait_for(
        &self,
        kind: &str,
        options: WaitOptions,
    ) -> impl Future<Output = Result<Value, ReplyError>> + Send + 'static {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut waits = self.registry.lock();
            if self.registry.closed.load(Ordering::SeqCst) {
                // Dropping `tx` fails the wait as soon as it is polled
                tracing::debug!("Not waiting for '{}': connection closed", kind);
            } else {
                waits.push(PendingWait {
                    id,
                    expected: kind.to_string(),
                    resolver: tx,
                });
                tracing::debug!("Waiting for '{}' (wait #{})", kind, id);
            }
        }

        let guard = Deregister {
            registry: self.registry.clone(),
            id,
        };
        let kind = kind.to_string();

        async move {
            let _guard = guard;
            let received = match options.timeout {
                Some(after) => match tokio::time::timeout(after, rx).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::debug!("Wait #{} for '{}' timed out", id, kind);
                        return Err(ReplyError::Timeout { kind, after });
                    }
                },
                None => rx.await,
            };

            match received {
                Ok(envelope) if options.unwrap_content => Ok(unwrap_content(envelope)),
                Ok(envelope) => Ok(envelope_to_value(envelope)),
                Err(_) => Err(ReplyError::Disconnected(kind)),
            }
        }
    }

    /// Offer an inbound envelope to every pending wait. Each wait whose type
    /// matches is resolved and removed; the others stay registered.
    /// Returns the number of waits satisfied.
    pub fn resolve(&self, envelope: &Envelope) -> usize {
        let matched: Vec<PendingWait> = {
            let mut waits = self.registry.lock();
            let (hit, keep): (Vec<_>, Vec<_>) = waits
                .drain(..)
                .partition(|w| w.expected == envelope.kind);
            *waits = keep;
            hit
        };

        let mut resolved = 0;
        for wait in matched {
            // The receiver may already be gone if its future was dropped
            if wait.resolver.send(envelope.clone()).is_ok() {
                resolved += 1;
            }
        }
        resolved
    }

    /// Drop every pending wait and refuse new ones. All their callers
    /// receive `Disconnected`.
    pub fn close(&self) {
        let mut waits = self.registry.lock();
        self.registry.closed.store(true, Ordering::SeqCst);
        waits.clear();
    }

    /// Number of waits currently registered
    pub fn pending(&self) -> usize {
        self.registry.lock().len()
    }
}

fn unwrap_content(envelope: Envelope) -> Value {
    if let Some(content) = envelope.content() {
        return content.clone();
    }
    if !envelope.data.is_null() {
        return envelope.data;
    }
    envelope_to_value(envelope)
}

fn envelope_to_value(envelope: Envelope) -> Value {
    serde_json::json!({ "type": envelope.kind, "data": envelope.data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(kind: &str, data: Value) -> Envelope {
        Envelope::new(kind, &data).unwrap()
    }

    #[tokio::test]
    async fn test_first_matching_envelope_resolves() {
        let correlator = Correlator::new();
        let wait = correlator.wait_for("ack", WaitOptions::default());

        assert_eq!(correlator.resolve(&env("other", json!(1))), 0);
        assert_eq!(correlator.resolve(&env("ack", json!({"n": 1}))), 1);
        assert_eq!(correlator.resolve(&env("ack", json!({"n": 2}))), 0);

        let value = wait.await.unwrap();
        assert_eq!(value, json!({"type": "ack", "data": {"n": 1}}));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_unwrap_priority() {
        let correlator = Correlator::new();
        let opts = WaitOptions::default().unwrap_content();

        let w = correlator.wait_for("info", opts);
        correlator.resolve(&env("info", json!({"content": "hi"})));
        assert_eq!(w.await.unwrap(), json!("hi"));

        let w = correlator.wait_for("info", opts);
        correlator.resolve(&env("info", json!({"x": 1})));
        assert_eq!(w.await.unwrap(), json!({"x": 1}));

        let w = correlator.wait_for("info", opts);
        correlator.resolve(&Envelope::bare("info"));
        assert_eq!(w.await.unwrap(), json!({"type": "info", "data": null}));
    }

    #[tokio::test]
    async fn test_concurrent_waits_on_same_type_both_resolve() {
        let correlator = Correlator::new();
        let a = correlator.wait_for("ack", WaitOptions::default());
        let b = correlator.wait_for("ack", WaitOptions::default());
        assert_eq!(correlator.pending(), 2);

        assert_eq!(correlator.resolve(&env("ack", json!("first"))), 2);

        assert_eq!(a.await.unwrap()["data"], json!("first"));
        assert_eq!(b.await.unwrap()["data"], json!("first"));
    }

    #[tokio::test]
    async fn test_waits_on_different_types_do_not_interfere() {
        let correlator = Correlator::new();
        let a = correlator.wait_for("alpha", WaitOptions::default());
        let b = correlator.wait_for("beta", WaitOptions::default());

        correlator.resolve(&env("beta", json!(2)));
        assert_eq!(correlator.pending(), 1);
        correlator.resolve(&env("alpha", json!(1)));

        assert_eq!(a.await.unwrap()["data"], json!(1));
        assert_eq!(b.await.unwrap()["data"], json!(2));
    }

    #[tokio::test]
    async fn test_timeout_deregisters_wait() {
        let correlator = Correlator::new();
        let wait = correlator.wait_for("ack", WaitOptions::timeout(Duration::from_millis(20)));

        match wait.await {
            Err(ReplyError::Timeout { kind, .. }) => assert_eq!(kind, "ack"),
            other => panic!("expected timeout, got {:?}", other),
        }

        assert_eq!(correlator.pending(), 0);
        assert_eq!(correlator.resolve(&env("ack", json!(null))), 0);
    }

    #[tokio::test]
    async fn test_dropped_future_deregisters_wait() {
        let correlator = Correlator::new();
        let wait = correlator.wait_for("ack", WaitOptions::default());
        assert_eq!(correlator.pending(), 1);
        drop(wait);
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_close_reports_disconnected() {
        let correlator = Correlator::new();
        let wait = correlator.wait_for("ack", WaitOptions::default());
        correlator.close();
        assert!(matches!(wait.await, Err(ReplyError::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_wait_after_close_fails_immediately() {
        let correlator = Correlator::new();
        correlator.close();

        let wait = correlator.wait_for("ack", WaitOptions::default());
        assert_eq!(correlator.pending(), 0);
        assert!(matches!(wait.await, Err(ReplyError::Disconnected(kind)) if kind == "ack"));
        assert_eq!(correlator.resolve(&env("ack", json!(null))), 0);
    }
}
