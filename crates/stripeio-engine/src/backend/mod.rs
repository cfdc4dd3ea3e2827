//! Backend collaborator contract
//!
//! The engine drives a remote object store through this trait. The store
//! only understands whole aligned extents; byte-level semantics live in the
//! engine above it. Dispatch is asynchronous: the returned future plays the
//! role of the async completion token, and the engine joins every
//! outstanding future before a call returns.

pub mod fs;
pub mod memory;

use crate::geometry::LayoutGeometry;
use async_trait::async_trait;
use bytes::Bytes;
use stripeio_common::{ObjectId, PoolId, Result};

/// Kind of block operation dispatched against the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOpKind {
    Read,
    Write,
}

impl BlockOpKind {
    /// Lowercase name, used for error tags and log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// A half-open byte range `[offset, offset + len)` addressed by one block
/// operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    /// Starting byte offset within the object
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
}

impl Extent {
    #[must_use]
    pub const fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// One past the last byte of the extent
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// An open backend object, as returned by `create`/`open`
#[derive(Clone, Copy, Debug)]
pub struct BackendObject {
    /// Object identifier
    pub id: ObjectId,
    /// Pool the object is bound to
    pub pool: PoolId,
    /// Layout id governing the object's stripe geometry
    pub layout: u64,
    /// Declared or estimated object size in bytes
    pub size_hint: u64,
}

/// The remote object store the engine drives.
///
/// Implementations must tolerate extents that reach past the written end of
/// an object: reads zero-fill the uncovered suffix, writes extend the
/// object. `create` on an existing object succeeds (truncating) when the
/// pool matches and fails with `PoolMismatch` otherwise.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Create an object. The size hint selects the layout; the pool hint
    /// overrides the backend's default pool.
    async fn create(
        &self,
        id: ObjectId,
        size_hint: u64,
        pool: Option<PoolId>,
    ) -> Result<BackendObject>;

    /// Open an existing object. A caller-supplied size hint overrides the
    /// size recorded by the backend, if any.
    async fn open(&self, id: ObjectId, size_hint: Option<u64>) -> Result<BackendObject>;

    /// Release backend-side state for the object.
    async fn close(&self, obj: &BackendObject) -> Result<()>;

    /// Look up the pool-version geometry bound to the object's layout id.
    async fn resolve_geometry(&self, obj: &BackendObject) -> Result<LayoutGeometry>;

    /// Dispatch one aligned block operation. For writes `payload` covers the
    /// extent and the returned bytes are empty; for reads `payload` is empty
    /// and the returned bytes cover the extent. `attrs` is the per-block
    /// attribute word (currently always zero).
    async fn dispatch_block_op(
        &self,
        obj: &BackendObject,
        kind: BlockOpKind,
        extent: Extent,
        payload: Bytes,
        attrs: u64,
    ) -> Result<Bytes>;
}
