//! Single-slot, latest-wins mailboxes
//!
//! A mailbox holds at most one pending value. Publishing replaces whatever is
//! pending, so a slow consumer only ever sees the freshest value and the
//! producer never blocks or queues.
//!
//! The slot lock is held only for the swap itself, never across a wait.
//!
//! Consumers compete for the slot: with several consumers on one mailbox, each
//! value goes to exactly one of them, whichever takes it first.

use std::sync::{Mutex, MutexGuard, PoisonError};

use smol::channel::{self, Receiver, Sender};

/// Overwrite-on-publish, get-and-clear-on-take slot
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the pending value, discarding any unread one
    ///
    /// Returns `true` if an unread value was discarded.
    pub fn publish(&self, value: T) -> bool {
        let superseded = self.lock().replace(value).is_some();
        if superseded {
            tracing::trace!("mailbox value superseded before it was read");
        }
        superseded
    }

    /// Take the pending value without blocking
    ///
    /// Returns `None` if nothing was published since the previous take.
    pub fn take_latest(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether a value is waiting to be taken
    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    // The slot is only ever swapped under the lock, so a panic elsewhere
    // cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mailbox with a coalescing wake signal for an async consumer
///
/// Every publish posts a wake, but at most one wake is ever pending: a burst of
/// publishes before the consumer runs results in a single wake-up that
/// observes the last value.
#[derive(Debug)]
pub struct WakeMailbox<T> {
    inner: Mailbox<T>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl<T> WakeMailbox<T> {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            inner: Mailbox::new(),
            wake_tx,
            wake_rx,
        }
    }

    /// Replace the pending value and wake a waiting consumer
    ///
    /// Never blocks. Returns `true` if an unread value was discarded.
    pub fn publish(&self, value: T) -> bool {
        let superseded = self.inner.publish(value);
        while self.wake_rx.try_recv().is_ok() {}
        // Full means another publisher raced us to post the wake, which is
        // just as good.
        let _ = self.wake_tx.try_send(());
        superseded
    }

    /// Take the pending value without waiting
    pub fn take_latest(&self) -> Option<T> {
        self.inner.take_latest()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    /// Wait for a wake, then take whatever value is current
    ///
    /// The value returned may be newer than the one whose publish caused the
    /// wake. If a competing consumer emptied the slot first, waits again, so
    /// a value is never delivered to more than one waiter.
    pub async fn wait_and_take(&self) -> T {
        loop {
            // Both channel ends live in `self`, so the channel cannot close.
            let _ = self.wake_rx.recv().await;
            if let Some(value) = self.inner.take_latest() {
                return value;
            }
        }
    }
}

impl<T> Default for WakeMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
