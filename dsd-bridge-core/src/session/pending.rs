use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::models::error::BridgeError;

type Outcome<T> = Result<T, BridgeError>;

struct Waiter<T> {
    key: String,
    tx: Sender<Outcome<T>>,
}

/// Holds at most one outstanding asynchronous request.
///
/// Arming a new request while one is outstanding resolves the old one with
/// [`BridgeError::PermissionSuperseded`] before the new one is installed.
/// Arming and taking share one lock, so a resolution can never land on a
/// request armed after it was taken.
pub struct PendingSlot<T> {
    waiter: Mutex<Option<Waiter<T>>>,
}

impl<T: Send + 'static> PendingSlot<T> {
    pub fn new() -> Self {
        Self {
            waiter: Mutex::new(None),
        }
    }

    /// Install a new request identified by `key`.
    pub fn arm(&self, key: impl Into<String>) -> Completion<T> {
        let key = key.into();
        let (tx, rx) = bounded(1);
        let previous = self.waiter.lock().replace(Waiter { key: key.clone(), tx });

        if let Some(previous) = previous {
            log::warn!(
                "Pending request for {} superseded by {}",
                previous.key,
                key
            );
            let _ = previous.tx.try_send(Err(BridgeError::PermissionSuperseded));
        }

        Completion { rx }
    }

    /// Take the outstanding request if it was armed for `key`.
    ///
    /// A mismatched key leaves the slot untouched.
    pub fn take_for(&self, key: &str) -> Option<Resolver<T>> {
        let mut slot = self.waiter.lock();
        if slot.as_ref().map(|w| w.key.as_str()) != Some(key) {
            return None;
        }
        slot.take().map(|w| Resolver { tx: w.tx })
    }

    /// Take whatever request is outstanding.
    pub fn take(&self) -> Option<Resolver<T>> {
        self.waiter.lock().take().map(|w| Resolver { tx: w.tx })
    }

    /// Resolve the outstanding request, if any. Returns whether one was.
    pub fn resolve(&self, outcome: Outcome<T>) -> bool {
        match self.take() {
            Some(resolver) => {
                resolver.resolve(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.waiter.lock().is_some()
    }

    pub fn pending_key(&self) -> Option<String> {
        self.waiter.lock().as_ref().map(|w| w.key.clone())
    }
}

impl<T: Send + 'static> Default for PendingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half of one request. Consumed on use, so it resolves at most once.
pub struct Resolver<T> {
    tx: Sender<Outcome<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, outcome: Outcome<T>) {
        // The caller may have dropped its completion; nothing to deliver to.
        let _ = self.tx.try_send(outcome);
    }
}

/// Read half of one request, held by the caller.
///
/// If the request is dropped without ever being resolved, the completion
/// reports [`BridgeError::InvalidState`] instead of waiting forever.
pub struct Completion<T> {
    rx: Receiver<Outcome<T>>,
}

impl<T> Completion<T> {
    /// A completion that is already resolved.
    pub fn ready(outcome: Outcome<T>) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.try_send(outcome);
        Self { rx }
    }

    /// Non-blocking poll. `None` while still outstanding.
    pub fn try_take(&self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// Wait up to `timeout`. `None` if still outstanding afterwards.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// Block until resolved.
    pub fn wait(self) -> Outcome<T> {
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }
}

fn abandoned() -> BridgeError {
    BridgeError::InvalidState("pending request abandoned".into())
}
