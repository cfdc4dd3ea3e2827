//! StripeIO Engine
//!
//! This crate turns byte-addressed reads and writes into bounded batches of
//! stripe-aligned block operations against an erasure-coded object store.
//! Callers see a plain stream (read, write, seek); underneath, each call is
//! split into blocks sized to the object's layout, dispatched concurrently
//! up to a configured bound, and settled into a contiguous confirmed byte
//! count.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  ObjectStream    │  cursor, read/write/seek
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  StripeEngine    │  block planning, slot pool,
//! │                  │  dispatch + drain, settling
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  StoreBackend    │  per-block I/O against the
//! │                  │  object store (memory / fs)
//! └──────────────────┘
//! ```
//!
//! A [`Session`] ties it together: it owns the backend, validates the
//! configuration, and hands out at most one open [`ObjectStream`] per
//! object id.

pub mod backend;
pub mod engine;
pub mod geometry;
pub mod plan;
pub mod session;
pub mod slot;
pub mod stream;

pub use backend::fs::FsBackend;
pub use backend::memory::MemoryBackend;
pub use backend::{BackendObject, BlockOpKind, Extent, StoreBackend};
pub use engine::StripeEngine;
pub use geometry::{LayoutGeometry, MAX_LAYOUT_ID, MIN_LAYOUT_ID, MIN_UNIT_SIZE};
pub use plan::{IoPlan, plan};
pub use session::Session;
pub use slot::{Slot, SlotPool};
pub use stream::{ObjectStream, Whence};
