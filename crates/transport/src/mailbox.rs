//! Synchronized single-slot mailbox
//!
//! Capacity-one handoff between independent workers. `put` waits while a
//! value is pending, `get` waits while the slot is empty. With one producer
//! and one consumer it behaves like an unbuffered synchronous channel.

use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Bounded handoff holding at most one value.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    filled: Notify,
    emptied: Notify,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            filled: Notify::new(),
            emptied: Notify::new(),
        }
    }

    /// Store `value`, waiting until the slot is free.
    pub async fn put(&self, value: T) {
        let mut pending = Some(value);
        loop {
            {
                let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = pending.take();
                    drop(slot);
                    self.filled.notify_one();
                    return;
                }
            }
            // notify_one leaves a permit when nobody waits, so a get that
            // empties the slot before we park still wakes us
            self.emptied.notified().await;
        }
    }

    /// Take the pending value, waiting until one is stored.
    pub async fn get(&self) -> T {
        loop {
            if let Some(value) = self.try_get() {
                return value;
            }
            self.filled.notified().await;
        }
    }

    /// Take the pending value if there is one.
    pub fn try_get(&self) -> Option<T> {
        let value = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if value.is_some() {
            self.emptied.notify_one();
        }
        value
    }

    /// Whether no value is pending
    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
