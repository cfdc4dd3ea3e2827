//! Stripe I/O engine
//!
//! Drives the chunked read/write loop over the backend: plans stripe-aligned
//! block sizes, borrows slots from the bounded pool, stages the trailing
//! partial block through a zeroed pad buffer, dispatches block operations
//! and joins every outstanding one before returning.
//!
//! Blocks are dispatched in strictly increasing offset order and may
//! complete out of order; each block within one call addresses a disjoint
//! extent, so completion order does not matter. Once a dispatched block
//! fails, no later block is issued; already-dispatched siblings are awaited
//! and the first failure in dispatch order wins. Bytes are accounted only
//! after confirmed completion: the returned count is the contiguous prefix
//! of successfully completed blocks.

use crate::backend::{BackendObject, BlockOpKind, Extent, StoreBackend};
use crate::geometry::LayoutGeometry;
use crate::plan::{self, IoPlan};
use crate::slot::{Slot, SlotPool};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use stripeio_common::{EngineConfig, Error, Result};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Outcome of one dispatched block, reported through the join set
struct BlockOutcome {
    /// Dispatch sequence number within the call
    seq: u64,
    ok: bool,
    /// Caller-visible bytes carried by the block (excludes tail padding)
    real_len: u64,
    /// Position of the block's first byte within the caller buffer
    buf_at: usize,
    /// Block data for reads, covering the padded extent
    data: Option<Bytes>,
}

const fn round_up(n: u64, to: u64) -> u64 {
    n.div_ceil(to) * to
}

/// Striped, concurrency-bounded block I/O over one open object
pub struct StripeEngine {
    backend: Arc<dyn StoreBackend>,
    obj: BackendObject,
    geom: LayoutGeometry,
    pool: SlotPool,
    /// Lazily allocated staging buffer for the trailing partial block
    pad: Option<Vec<u8>>,
    /// Known object size: the declared size, extended by confirmed writes
    size: u64,
    max_block_bytes: u64,
    open: bool,
}

impl StripeEngine {
    /// Build an engine over an open backend object with resolved geometry
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        obj: BackendObject,
        geom: LayoutGeometry,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = SlotPool::new(config.threads)?;
        Ok(Self {
            backend,
            size: obj.size_hint,
            obj,
            geom,
            pool,
            pad: None,
            max_block_bytes: config.max_block_bytes,
            open: true,
        })
    }

    #[must_use]
    pub fn object(&self) -> &BackendObject {
        &self.obj
    }

    #[must_use]
    pub fn geometry(&self) -> &LayoutGeometry {
        &self.geom
    }

    /// Declared size extended by confirmed writes; reads never go past it
    #[must_use]
    pub fn known_size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Write `buf` at `offset`. Returns the confirmed byte count; on error
    /// a prefix of the transfer may have been persisted (see `write_some`).
    pub async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        let (n, err) = self.write_some(buf, offset).await;
        match err {
            Some(e) => Err(e),
            None => Ok(n as usize),
        }
    }

    /// Read into `buf` from `offset`. Returns `Ok(0)` when `offset` is at
    /// or beyond the known object size (end of stream, not an error).
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let (n, err) = self.read_some(buf, offset).await;
        match err {
            Some(e) => Err(e),
            None => Ok(n as usize),
        }
    }

    /// Release the slots, the pad buffer and the backend-side object state.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        self.open = false;
        self.pad = None;
        self.backend.close(&self.obj).await
    }

    /// Write loop. Returns (confirmed bytes, first error in dispatch order).
    pub(crate) async fn write_some(&mut self, buf: &[u8], offset: u64) -> (u64, Option<Error>) {
        if !self.open {
            return (0, Some(Error::NotOpen));
        }
        if buf.is_empty() {
            return (0, None);
        }
        let total = buf.len() as u64;
        let (confirmed, err) = self
            .transfer(BlockOpKind::Write, Some(buf), None, offset, total)
            .await;
        if confirmed > 0 {
            self.size = self.size.max(offset + confirmed);
        }
        (confirmed, err)
    }

    /// Read loop. Clips the requested length at the known object size.
    pub(crate) async fn read_some(&mut self, buf: &mut [u8], offset: u64) -> (u64, Option<Error>) {
        if !self.open {
            return (0, Some(Error::NotOpen));
        }
        if buf.is_empty() || offset >= self.size {
            // at or past the end of stream: zero bytes, no error
            return (0, None);
        }
        let total = (buf.len() as u64).min(self.size - offset);
        self.transfer(BlockOpKind::Read, None, Some(buf), offset, total)
            .await
    }

    /// Shared dispatch loop. Exactly one of `src`/`dst` is set, matching
    /// `kind`; `total` is the already-clipped transfer length.
    async fn transfer(
        &mut self,
        kind: BlockOpKind,
        src: Option<&[u8]>,
        dst: Option<&mut [u8]>,
        offset: u64,
        total: u64,
    ) -> (u64, Option<Error>) {
        let start = Instant::now();
        let IoPlan {
            block_size,
            group_size,
        } = plan::plan(total, &self.geom, self.max_block_bytes);

        let failed = Arc::new(AtomicBool::new(false));
        let mut join_set: JoinSet<BlockOutcome> = JoinSet::new();
        let mut remaining = total;
        let mut done: usize = 0;
        let mut at = offset;
        let mut seq: u64 = 0;
        let mut acquire_err: Option<Error> = None;

        while remaining > 0 && !failed.load(Ordering::Acquire) {
            let bs = block_size.min(remaining);
            let mut slot = match self.pool.acquire().await {
                Ok(slot) => slot,
                Err(e) => {
                    acquire_err = Some(e);
                    break;
                }
            };
            if slot.last_err.is_some() {
                // fail-fast: this slot's previous borrow failed; keep the
                // recorded error for the post-drain sweep
                self.pool.requeue(slot);
                break;
            }

            let padded = round_up(bs, group_size);
            let payload = match kind {
                BlockOpKind::Write => {
                    let src = src.unwrap_or(&[]);
                    slot.buf.clear();
                    if padded == bs {
                        slot.buf.extend_from_slice(&src[done..done + bs as usize]);
                    } else {
                        // trailing partial block: stage through the zeroed
                        // pad buffer so the extent stays group-aligned
                        let pad = self.pad.get_or_insert_with(Vec::new);
                        pad.clear();
                        pad.resize(padded as usize, 0);
                        pad[..bs as usize].copy_from_slice(&src[done..done + bs as usize]);
                        slot.buf.extend_from_slice(pad);
                    }
                    slot.buf.split().freeze()
                }
                BlockOpKind::Read => Bytes::new(),
            };

            let extent = Extent::new(at, padded);
            slot.extent = extent;
            slot.attrs = 0;
            self.spawn_block(&mut join_set, slot, seq, kind, extent, payload, bs, done, &failed);

            seq += 1;
            done += bs as usize;
            at += bs;
            remaining -= bs;
        }

        // drain barrier: every dispatched operation finishes before we return
        let mut outcomes = Vec::with_capacity(seq as usize);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "block I/O task failed to join"),
            }
        }
        let slot_errors = self.pool.sweep_errors();
        let (confirmed, prefix, first_err) = settle(&mut outcomes, slot_errors);

        if let Some(dst) = dst {
            for outcome in &outcomes[..prefix] {
                if let Some(data) = &outcome.data {
                    let len = outcome.real_len as usize;
                    dst[outcome.buf_at..outcome.buf_at + len].copy_from_slice(&data[..len]);
                }
            }
        }

        let err = first_err.or(acquire_err);
        debug!(
            object = %self.obj.id,
            op = kind.as_str(),
            offset,
            len = total,
            block_size,
            group_size,
            confirmed,
            elapsed_us = start.elapsed().as_micros() as u64,
            "stripe transfer"
        );
        (confirmed, err)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_block(
        &self,
        join_set: &mut JoinSet<BlockOutcome>,
        slot: Slot,
        seq: u64,
        kind: BlockOpKind,
        extent: Extent,
        payload: Bytes,
        real_len: u64,
        buf_at: usize,
        failed: &Arc<AtomicBool>,
    ) {
        let backend = Arc::clone(&self.backend);
        let obj = self.obj;
        let releaser = self.pool.releaser();
        let failed = Arc::clone(failed);
        let attrs = slot.attrs;
        join_set.spawn(async move {
            match backend
                .dispatch_block_op(&obj, kind, extent, payload, attrs)
                .await
            {
                Ok(data) => {
                    releaser.release(slot, None).await;
                    BlockOutcome {
                        seq,
                        ok: true,
                        real_len,
                        buf_at,
                        data: matches!(kind, BlockOpKind::Read).then_some(data),
                    }
                }
                Err(e) => {
                    failed.store(true, Ordering::Release);
                    let tagged = e.at_extent(kind.as_str(), extent.offset, extent.len);
                    releaser.release(slot, Some((seq, tagged))).await;
                    BlockOutcome {
                        seq,
                        ok: false,
                        real_len,
                        buf_at,
                        data: None,
                    }
                }
            }
        });
    }
}

/// Order outcomes by dispatch sequence and compute the confirmed contiguous
/// prefix plus the winning error. Returns (confirmed bytes, prefix length,
/// first error).
fn settle(
    outcomes: &mut [BlockOutcome],
    slot_errors: Vec<(u64, Error)>,
) -> (u64, usize, Option<Error>) {
    outcomes.sort_by_key(|o| o.seq);

    let mut first: Option<(u64, Error)> = None;
    for (seq, err) in slot_errors {
        match &first {
            Some((s, _)) if *s <= seq => {}
            _ => first = Some((seq, err)),
        }
    }
    let fail_seq = first.as_ref().map(|(s, _)| *s);

    let mut confirmed = 0u64;
    let mut prefix = 0usize;
    for (i, outcome) in outcomes.iter().enumerate() {
        if outcome.seq != i as u64
            || !outcome.ok
            || fail_seq.is_some_and(|s| outcome.seq >= s)
        {
            break;
        }
        confirmed += outcome.real_len;
        prefix += 1;
    }

    (confirmed, prefix, first.map(|(_, e)| e))
}
