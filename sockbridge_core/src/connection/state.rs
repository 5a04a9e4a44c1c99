//! Connection lifecycle state and the one-shot readiness signal

use std::fmt;
use tokio::sync::watch;

/// Lifecycle of a connection. Transitions only move forward:
/// `Connecting -> Open -> Closed` (or `Connecting -> Closed` on failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared state cell. Rejects backwards transitions.
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Advance to `next`. Returns false if that would move backwards or
    /// repeat the current state.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Resolve once the state reaches `target` or later
    pub async fn reached(&self, target: ConnectionState) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion signal that any number of waiters may attach to, before or
/// after it fires. Fires at most once.
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns true only for the first call.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Complete immediately if already fired, otherwise on the firing.
    /// Stays pending forever if the signal never fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
