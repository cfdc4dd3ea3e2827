//! Bounded pool of reusable I/O slots
//!
//! A slot bounds one in-flight block operation: it carries the staging
//! buffer, the extent being addressed, the attribute word and the error
//! (if any) from its previous use. The pool holds a fixed number of slots
//! in a channel; acquiring suspends the caller while every slot is
//! borrowed, which caps the number of concurrently dispatched device
//! operations. One pool per handle, never shared.

use crate::backend::Extent;
use bytes::BytesMut;
use stripeio_common::{Error, Result};
use tokio::sync::mpsc;

/// A reusable buffer/extent/attribute triple bounding one in-flight block
/// operation
#[derive(Debug)]
pub struct Slot {
    /// Stable index within the pool
    pub idx: usize,
    /// Staging buffer for the outgoing payload
    pub buf: BytesMut,
    /// Extent addressed by the slot's current borrow
    pub extent: Extent,
    /// Per-block attribute word
    pub attrs: u64,
    /// Error recorded by the slot's previous borrow, tagged with its
    /// dispatch sequence number
    pub last_err: Option<(u64, Error)>,
}

impl Slot {
    fn new(idx: usize) -> Self {
        Self {
            idx,
            buf: BytesMut::new(),
            extent: Extent::new(0, 0),
            attrs: 0,
            last_err: None,
        }
    }
}

/// Fixed-capacity pool of slots
pub struct SlotPool {
    rx: mpsc::Receiver<Slot>,
    tx: mpsc::Sender<Slot>,
    capacity: usize,
}

impl SlotPool {
    /// Allocate a pool of `capacity` slots
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::allocation("slot pool capacity must be at least 1"));
        }
        let (tx, rx) = mpsc::channel(capacity);
        for idx in 0..capacity {
            tx.try_send(Slot::new(idx))
                .map_err(|_| Error::allocation("failed to seed slot pool"))?;
        }
        Ok(Self { rx, tx, capacity })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the next free slot, suspending while all are borrowed
    pub async fn acquire(&mut self) -> Result<Slot> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::allocation("slot pool closed"))
    }

    /// Put a slot straight back without touching its recorded error
    pub fn requeue(&self, slot: Slot) {
        // capacity is reserved for exactly this slot
        let _ = self.tx.try_send(slot);
    }

    /// Handle used by in-flight operations to return their slot
    #[must_use]
    pub fn releaser(&self) -> SlotReleaser {
        SlotReleaser {
            tx: self.tx.clone(),
        }
    }

    /// Collect the errors recorded on idle slots, clearing them.
    ///
    /// Must only be called after the drain barrier, when no borrow is
    /// outstanding. Returns (dispatch sequence, error) pairs.
    pub fn sweep_errors(&mut self) -> Vec<(u64, Error)> {
        let mut errors = Vec::new();
        let mut idle = Vec::new();
        while let Ok(mut slot) = self.rx.try_recv() {
            if let Some(tagged) = slot.last_err.take() {
                errors.push(tagged);
            }
            idle.push(slot);
            if idle.len() == self.capacity {
                break;
            }
        }
        for slot in idle {
            let _ = self.tx.try_send(slot);
        }
        errors
    }
}

/// Clonable release handle held by each in-flight operation
#[derive(Clone)]
pub struct SlotReleaser {
    tx: mpsc::Sender<Slot>,
}

impl SlotReleaser {
    /// Return a slot to the pool, recording the outcome of its borrow
    pub async fn release(&self, mut slot: Slot, err: Option<(u64, Error)>) {
        slot.last_err = err;
        // the pool never drops its receiver while borrows are outstanding
        let _ = self.tx.send(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let mut pool = SlotPool::new(2).unwrap();
        let releaser = pool.releaser();

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.idx, b.idx);

        // both slots borrowed: the third acquire must suspend
        let blocked = timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());

        releaser.release(a, None).await;
        let c = timeout(Duration::from_millis(50), pool.acquire())
            .await
            .expect("acquire should resume after a release")
            .unwrap();
        releaser.release(b, None).await;
        releaser.release(c, None).await;
    }

    #[tokio::test]
    async fn test_sweep_returns_recorded_errors() {
        let mut pool = SlotPool::new(2).unwrap();
        let releaser = pool.releaser();

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        releaser.release(a, Some((7, Error::DeviceCode(-5)))).await;
        releaser.release(b, None).await;

        let errors = pool.sweep_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 7);

        // the sweep clears recorded errors and requeues every slot
        assert!(pool.sweep_errors().is_empty());
        assert!(pool.acquire().await.unwrap().last_err.is_none());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(SlotPool::new(0).is_err());
    }
}
