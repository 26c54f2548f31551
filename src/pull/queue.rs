//! Bounded circular slot queue between readers and the writer.
//!
//! Readers reserve slots in identifier order and fill them as fetches
//! complete, possibly out of order; the single writer drains slots strictly
//! from the oldest reservation, so commit order always equals listing order.
//! Backpressure runs both ways: readers park when every slot is reserved or
//! filled, the writer parks until the oldest slot is resolved.
//!
//! Space accounting uses a semaphore with one permit per slot, so any number
//! of waiting readers are served FIFO; the writer side is a notify with a
//! re-check loop, which is lossless for a single consumer. Every wait races
//! the session's cancellation token.

use crate::types::PendingObject;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// How a reserved slot was resolved.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A fetched object ready to commit
    Object(PendingObject),
    /// Nothing to commit: the object was already present locally, or the
    /// fetch was abandoned at shutdown
    Skip,
}

#[derive(Debug)]
enum Slot {
    Empty,
    Reserved,
    Filled(Resolution),
}

struct QueueInner {
    slots: Vec<Slot>,
    /// Index of the oldest unconsumed slot
    cur: usize,
    /// Number of reserved-or-filled slots; never exceeds capacity
    count: usize,
}

/// A reservation handed to exactly one reader; must be resolved via
/// [`SlotQueue::resolve`].
#[derive(Debug)]
pub(crate) struct SlotReservation {
    pos: usize,
}

pub(crate) struct SlotQueue {
    capacity: usize,
    space: Semaphore,
    filled: Notify,
    inner: Mutex<QueueInner>,
}

impl SlotQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            space: Semaphore::new(capacity),
            filled: Notify::new(),
            inner: Mutex::new(QueueInner {
                slots: (0..capacity).map(|_| Slot::Empty).collect(),
                cur: 0,
                count: 0,
            }),
        }
    }

    // The inner mutex is only held for index bookkeeping, never across await.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next slot, waiting for space if the queue is full.
    ///
    /// Returns `None` if stop is requested before space frees up. Callers
    /// must reserve in identifier order (the listing gate serializes this).
    pub(crate) async fn reserve(&self, cancel: &CancellationToken) -> Option<SlotReservation> {
        let permit = tokio::select! {
            permit = self.space.acquire() => permit.ok()?,
            _ = cancel.cancelled() => return None,
        };
        // Slot ownership transfers to the reservation; the permit comes back
        // via add_permits when the writer frees the slot.
        permit.forget();

        let mut inner = self.lock();
        let pos = (inner.cur + inner.count) % self.capacity;
        debug_assert!(matches!(inner.slots[pos], Slot::Empty));
        inner.slots[pos] = Slot::Reserved;
        inner.count += 1;
        Some(SlotReservation { pos })
    }

    /// Publish the resolution for a reserved slot, waking the writer if it is
    /// parked on this slot.
    pub(crate) fn resolve(&self, reservation: SlotReservation, resolution: Resolution) {
        {
            let mut inner = self.lock();
            debug_assert!(matches!(inner.slots[reservation.pos], Slot::Reserved));
            inner.slots[reservation.pos] = Slot::Filled(resolution);
        }
        self.filled.notify_one();
    }

    /// Take the resolution of the oldest slot, waiting until it is filled.
    ///
    /// Frees the slot, advances the cursor and returns a permit to any reader
    /// parked on space. Returns `None` if stop is requested first. Single
    /// consumer only.
    pub(crate) async fn take_next(&self, cancel: &CancellationToken) -> Option<Resolution> {
        loop {
            let notified = self.filled.notified();
            {
                let mut inner = self.lock();
                let cur = inner.cur;
                match std::mem::replace(&mut inner.slots[cur], Slot::Empty) {
                    Slot::Filled(resolution) => {
                        inner.cur = (cur + 1) % self.capacity;
                        inner.count -= 1;
                        drop(inner);
                        self.space.add_permits(1);
                        return Some(resolution);
                    }
                    state => inner.slots[cur] = state,
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Number of reserved-or-filled slots.
    pub(crate) fn backlog(&self) -> usize {
        self.lock().count
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
