use std::sync::atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::response::Continuation;

/// A call accepted by `submit` and waiting for the sender loop.
pub(crate) struct PendingCall {
    pub(crate) slot: u16,
    /// Sweep tick at submission.
    pub(crate) created: u32,
    pub(crate) request: Bytes,
    pub(crate) continuation: Continuation,
}

/// One correlation entry.
///
/// `salt` is the ownership token: non-zero while a call awaits its response.
/// Whoever swaps it back to zero (receiver, sweeper or teardown) owns the
/// continuation and is responsible for releasing the slot.
struct Slot {
    salt: AtomicU16,
    created: AtomicU32,
    continuation: Mutex<Option<Continuation>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            salt: AtomicU16::new(0),
            created: AtomicU32::new(0),
            continuation: Mutex::new(None),
        }
    }

    fn claim(&self, salt: u16) -> Option<Continuation> {
        self.salt
            .compare_exchange(salt, 0, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.continuation.lock().take()
    }
}

/// Fixed table of correlation slots plus the queue of free indices.
pub(crate) struct SlotPool {
    slots: Box<[Slot]>,
    free_tx: Sender<u16>,
    free_rx: Receiver<u16>,
    in_use: AtomicUsize,
    next_salt: AtomicU16,
}

impl SlotPool {
    /// Create a pool with every index in `0..capacity` free, lowest first.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u16::MAX as usize);
        let (free_tx, free_rx) = bounded(capacity);
        for index in 0..capacity {
            // Cannot fail: the channel holds exactly `capacity` entries.
            let _ = free_tx.try_send(index as u16);
        }

        Self {
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            free_tx,
            free_rx,
            in_use: AtomicUsize::new(0),
            next_salt: AtomicU16::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots handed out to calls and not yet released.
    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Take a free index for a call, waiting up to `timeout`.
    pub(crate) fn allocate(&self, timeout: Duration) -> Option<u16> {
        let index = self.pop_free(timeout)?;
        self.in_use.fetch_add(1, Ordering::AcqRel);
        Some(index)
    }

    /// Return a call's index to the free queue.
    pub(crate) fn release(&self, index: u16) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        self.push_free(index);
    }

    /// Take a free index without counting it as in use (load withholding).
    pub(crate) fn pop_free(&self, timeout: Duration) -> Option<u16> {
        self.free_rx.recv_timeout(timeout).ok()
    }

    /// Put back an index taken with [`pop_free`](Self::pop_free).
    pub(crate) fn push_free(&self, index: u16) {
        if self.free_tx.try_send(index).is_err() {
            tracing::error!(index, "free slot queue overflow");
        }
    }

    /// Next salt for this connection; never zero.
    pub(crate) fn next_salt(&self) -> u16 {
        loop {
            let salt = self.next_salt.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if salt != 0 {
                return salt;
            }
        }
    }

    /// Move a slot to in-flight: record the call, then publish its salt.
    pub(crate) fn occupy(&self, index: u16, salt: u16, created: u32, continuation: Continuation) {
        let slot = &self.slots[usize::from(index)];
        slot.created.store(created, Ordering::Relaxed);
        *slot.continuation.lock() = Some(continuation);
        slot.salt.store(salt, Ordering::Release);
    }

    /// Claim the call a response frame addresses.
    ///
    /// Returns `None` for salt zero, out-of-range slots, and salts that no
    /// longer match (late response to a timed-out or reused slot).
    pub(crate) fn complete(&self, index: u16, salt: u16) -> Option<Continuation> {
        if salt == 0 {
            return None;
        }
        self.slots.get(usize::from(index))?.claim(salt)
    }

    /// Claim the call in `index` if it has waited more than `timeout_ticks`.
    pub(crate) fn expire(&self, index: usize, now: u32, timeout_ticks: u32) -> Option<Continuation> {
        let slot = self.slots.get(index)?;
        let salt = slot.salt.load(Ordering::Acquire);
        if salt == 0 {
            return None;
        }
        let age = now.wrapping_sub(slot.created.load(Ordering::Relaxed));
        if age <= timeout_ticks {
            return None;
        }
        slot.claim(salt)
    }

    /// Claim every in-flight call. Slots are not released.
    pub(crate) fn claim_all(&self) -> Vec<(u16, Continuation)> {
        let mut claimed = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let salt = slot.salt.load(Ordering::Acquire);
            if salt == 0 {
                continue;
            }
            if let Some(continuation) = slot.claim(salt) {
                claimed.push((index as u16, continuation));
            }
        }
        claimed
    }
}
