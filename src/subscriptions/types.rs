//! Subscription types for live watches.

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Shared cancellation flag for one subscription.
///
/// Clones observe the same flag. The producer side checks it before every
/// send and forgets the subscription once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the subscription. Returns true only for the call that flipped
    /// the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Why a subscription was dropped by the producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Underlying transport failed.
    Error(String),
}

/// Events delivered on a watch stream.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent<T> {
    /// A new snapshot of the watched query or document.
    Snapshot(T),
    /// The producer stopped serving this subscription.
    Dropped(DropReason),
}

/// Consumer end of a live watch.
///
/// Dropping the handle disconnects the channel, which the producer treats
/// like a cancellation on its next send. Explicit [`Subscription::cancel`]
/// takes effect immediately.
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: Receiver<WatchEvent<T>>,
    token: CancelToken,
    /// Set once a receive observed the producer hanging up.
    closed: AtomicBool,
}

impl<T> Subscription<T> {
    pub fn new(id: SubscriptionId, receiver: Receiver<WatchEvent<T>>, token: CancelToken) -> Self {
        Self {
            id,
            receiver,
            token,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn receiver(&self) -> &Receiver<WatchEvent<T>> {
        &self.receiver
    }

    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the producer stopped serving this subscription and every
    /// buffered event has been received. Cancellation does not close.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Try to receive an event (non-blocking). Cancelled subscriptions
    /// report `Disconnected`.
    pub fn try_recv(&self) -> Result<WatchEvent<T>, TryRecvError> {
        if self.token.is_cancelled() {
            return Err(TryRecvError::Disconnected);
        }
        let result = self.receiver.try_recv();
        if let Err(TryRecvError::Disconnected) = result {
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent<T>, RecvTimeoutError> {
        if self.token.is_cancelled() {
            return Err(RecvTimeoutError::Disconnected);
        }
        let result = self.receiver.recv_timeout(timeout);
        if let Err(RecvTimeoutError::Disconnected) = result {
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }

    /// Take every event currently buffered.
    pub fn drain(&self) -> Vec<WatchEvent<T>> {
        let mut events = Vec::new();
        while let Ok(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.cancel());
        assert!(!clone.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancelled_subscription_stops_receiving() {
        let (tx, rx) = bounded(4);
        let sub: Subscription<u32> = Subscription::new(SubscriptionId(1), rx, CancelToken::new());

        tx.send(WatchEvent::Snapshot(1)).unwrap();
        tx.send(WatchEvent::Snapshot(2)).unwrap();
        assert_eq!(sub.drain().len(), 2);

        tx.send(WatchEvent::Snapshot(3)).unwrap();
        sub.cancel();
        assert!(sub.drain().is_empty());
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_producer_hang_up_closes_after_buffer() {
        let (tx, rx) = bounded(4);
        let sub: Subscription<u32> = Subscription::new(SubscriptionId(2), rx, CancelToken::new());

        tx.send(WatchEvent::Snapshot(7)).unwrap();
        drop(tx);
        assert!(!sub.is_closed());

        assert_eq!(sub.drain(), vec![WatchEvent::Snapshot(7)]);
        assert!(sub.is_closed());
        assert!(!sub.is_cancelled());
    }

    #[test]
    fn test_cancel_does_not_close() {
        let (_tx, rx) = bounded::<WatchEvent<u32>>(1);
        let sub = Subscription::new(SubscriptionId(3), rx, CancelToken::new());
        sub.cancel();
        assert!(sub.drain().is_empty());
        assert!(!sub.is_closed());
    }
}
