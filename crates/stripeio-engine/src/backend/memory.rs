//! In-memory reference backend
//!
//! Keeps whole objects in a mutex-guarded map. Exists so the engine can be
//! exercised without a live store: it checks extent alignment the way a
//! real device would, and carries fault-injection and in-flight
//! instrumentation hooks for tests.

use crate::backend::{BackendObject, BlockOpKind, Extent, StoreBackend};
use crate::geometry::{self, LayoutGeometry};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use stripeio_common::{Error, ObjectId, PoolId, Result};

struct StoredObject {
    data: Vec<u8>,
    pool: PoolId,
    layout: u64,
    size_hint: u64,
}

/// Map-backed store with instrumentation hooks
pub struct MemoryBackend {
    pool: PoolId,
    data_units: u32,
    parity_units: u32,
    spare_units: u32,
    pool_width: u32,
    dispatch_delay: Option<Duration>,
    objects: Mutex<HashMap<ObjectId, StoredObject>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    dispatched: AtomicU64,
    fail_on: AtomicU64,
}

impl MemoryBackend {
    /// Create a backend answering for `pool` with the default 4+2 striping
    /// over 8 devices
    #[must_use]
    pub fn new(pool: PoolId) -> Self {
        Self {
            pool,
            data_units: 4,
            parity_units: 2,
            spare_units: 0,
            pool_width: 8,
            dispatch_delay: None,
            objects: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            dispatched: AtomicU64::new(0),
            fail_on: AtomicU64::new(0),
        }
    }

    /// Override the stripe parameters
    #[must_use]
    pub fn with_striping(mut self, n: u32, k: u32, s: u32, p: u32) -> Self {
        self.data_units = n;
        self.parity_units = k;
        self.spare_units = s;
        self.pool_width = p;
        self
    }

    /// Delay every dispatch, modelling device latency
    #[must_use]
    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }

    /// Make the `n`-th dispatch (1-based, counted across the backend) fail
    pub fn fail_dispatch(&self, n: u64) {
        self.fail_on.store(n, Ordering::SeqCst);
    }

    /// Total dispatches observed so far
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously in-flight dispatches
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn group_size(&self, layout: u64) -> Result<u64> {
        let unit = geometry::unit_size_for(layout)
            .ok_or_else(|| Error::layout_not_found(layout, "unknown layout id"))?;
        Ok(unit * u64::from(self.data_units))
    }

    fn perform(
        &self,
        obj: &BackendObject,
        kind: BlockOpKind,
        extent: Extent,
        payload: &Bytes,
    ) -> Result<Bytes> {
        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(&obj.id)
            .ok_or_else(|| Error::backend(format!("no such object: {}", obj.id)))?;
        let offset = usize::try_from(extent.offset)
            .map_err(|_| Error::backend("extent offset out of range"))?;
        let len = usize::try_from(extent.len)
            .map_err(|_| Error::backend("extent length out of range"))?;
        match kind {
            BlockOpKind::Write => {
                if payload.len() != len {
                    return Err(Error::backend("payload does not cover the extent"));
                }
                if stored.data.len() < offset + len {
                    stored.data.resize(offset + len, 0);
                }
                stored.data[offset..offset + len].copy_from_slice(payload);
                Ok(Bytes::new())
            }
            BlockOpKind::Read => {
                let mut out = vec![0u8; len];
                if offset < stored.data.len() {
                    let avail = (stored.data.len() - offset).min(len);
                    out[..avail].copy_from_slice(&stored.data[offset..offset + avail]);
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn create(
        &self,
        id: ObjectId,
        size_hint: u64,
        pool: Option<PoolId>,
    ) -> Result<BackendObject> {
        let requested = pool.unwrap_or(self.pool);
        let layout = geometry::layout_for_size(size_hint, self.data_units);
        let mut objects = self.objects.lock();
        if let Some(existing) = objects.get_mut(&id) {
            if existing.pool != requested {
                return Err(Error::PoolMismatch {
                    object: id,
                    requested,
                    actual: existing.pool,
                });
            }
            existing.data.clear();
            existing.layout = layout;
            existing.size_hint = size_hint;
        } else {
            objects.insert(
                id,
                StoredObject {
                    data: Vec::new(),
                    pool: requested,
                    layout,
                    size_hint,
                },
            );
        }
        Ok(BackendObject {
            id,
            pool: requested,
            layout,
            size_hint,
        })
    }

    async fn open(&self, id: ObjectId, size_hint: Option<u64>) -> Result<BackendObject> {
        let objects = self.objects.lock();
        let stored = objects
            .get(&id)
            .ok_or_else(|| Error::backend(format!("no such object: {id}")))?;
        Ok(BackendObject {
            id,
            pool: stored.pool,
            layout: stored.layout,
            size_hint: size_hint.unwrap_or(stored.size_hint),
        })
    }

    async fn close(&self, _obj: &BackendObject) -> Result<()> {
        Ok(())
    }

    async fn resolve_geometry(&self, obj: &BackendObject) -> Result<LayoutGeometry> {
        let unit_size = geometry::unit_size_for(obj.layout)
            .ok_or_else(|| Error::layout_not_found(obj.layout, "unknown layout id"))?;
        Ok(LayoutGeometry {
            unit_size,
            data_units: self.data_units,
            parity_units: self.parity_units,
            spare_units: self.spare_units,
            pool_width: self.pool_width,
        })
    }

    async fn dispatch_block_op(
        &self,
        obj: &BackendObject,
        kind: BlockOpKind,
        extent: Extent,
        payload: Bytes,
        _attrs: u64,
    ) -> Result<Bytes> {
        let seq = self.dispatched.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = async {
            let gs = self.group_size(obj.layout)?;
            if extent.len == 0 || extent.len % gs != 0 {
                return Err(Error::backend(format!(
                    "extent length {} is not a whole number of {gs}-byte groups",
                    extent.len
                )));
            }
            if let Some(delay) = self.dispatch_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.load(Ordering::SeqCst) == seq {
                return Err(Error::DeviceCode(-5));
            }
            self.perform(obj, kind, extent, &payload)
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unaligned_extent() {
        let backend = MemoryBackend::new(PoolId::new(1, 1));
        let obj = backend.create(ObjectId::new(1, 2), 0, None).await.unwrap();
        // layout 1 with 4 data units: group size 16384
        let err = backend
            .dispatch_block_op(
                &obj,
                BlockOpKind::Write,
                Extent::new(0, 100),
                Bytes::from(vec![0u8; 100]),
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test]
    async fn test_create_pool_mismatch() {
        let backend = MemoryBackend::new(PoolId::new(1, 1));
        let id = ObjectId::new(1, 2);
        backend.create(id, 0, None).await.unwrap();
        let err = backend
            .create(id, 0, Some(PoolId::new(2, 2)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolMismatch { .. }));
    }

    #[tokio::test]
    async fn test_read_zero_fills_past_end() {
        let backend = MemoryBackend::new(PoolId::new(1, 1));
        let obj = backend.create(ObjectId::new(1, 3), 0, None).await.unwrap();
        let gs = 16384;
        backend
            .dispatch_block_op(
                &obj,
                BlockOpKind::Write,
                Extent::new(0, gs),
                Bytes::from(vec![7u8; gs as usize]),
                0,
            )
            .await
            .unwrap();
        let data = backend
            .dispatch_block_op(
                &obj,
                BlockOpKind::Read,
                Extent::new(0, 2 * gs),
                Bytes::new(),
                0,
            )
            .await
            .unwrap();
        assert_eq!(data.len() as u64, 2 * gs);
        assert!(data[..gs as usize].iter().all(|&b| b == 7));
        assert!(data[gs as usize..].iter().all(|&b| b == 0));
    }
}
