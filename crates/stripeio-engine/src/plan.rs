//! Block size planning
//!
//! Picks the (block, group) sizes for the next chunked I/O loop so that
//! every dispatched block is stripe-aligned. Sizing depends on the transfer
//! length, so it is recomputed at the start of every read/write call; the
//! geometry itself never changes for an open handle.

use crate::geometry::LayoutGeometry;

/// Chunk sizing for one I/O loop iteration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoPlan {
    /// Bytes carried by one dispatched block
    pub block_size: u64,
    /// Bytes spanned by one full data stripe
    pub group_size: u64,
}

/// Plan the block size for a transfer of `remaining` bytes.
///
/// The returned block size is always a whole number of groups and never
/// exceeds the geometry's maximum block; `cap` bounds the candidate length
/// to keep per-iteration memory in check.
#[must_use]
pub fn plan(remaining: u64, geom: &LayoutGeometry, cap: u64) -> IoPlan {
    let candidate = remaining.min(cap);
    let gs = geom.group_size();
    let max_bs = geom.max_block();

    let block_size = if candidate >= max_bs {
        max_bs
    } else if candidate <= gs {
        gs
    } else {
        // next power of two, rounded out to a whole group
        let pow2 = candidate.next_power_of_two();
        (pow2.div_ceil(gs) * gs).min(max_bs)
    };

    IoPlan {
        block_size,
        group_size: gs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: u64 = 512 * 1024 * 1024;

    fn geom(unit_size: u64, n: u32, k: u32, s: u32, p: u32) -> LayoutGeometry {
        LayoutGeometry {
            unit_size,
            data_units: n,
            parity_units: k,
            spare_units: s,
            pool_width: p,
        }
    }

    #[test]
    fn test_plan_alignment_sweep() {
        let geoms = [
            geom(4096, 4, 2, 0, 8),
            geom(4096, 3, 2, 1, 7),
            geom(16384, 1, 0, 0, 1),
            geom(65536, 8, 2, 2, 16),
            geom(4096, 6, 3, 0, 12),
        ];
        for g in &geoms {
            let gs = g.group_size();
            let max_bs = g.max_block();
            let lengths = [
                1,
                gs - 1,
                gs,
                gs + 1,
                2 * gs + 17,
                max_bs - 1,
                max_bs,
                max_bs + 1,
                10 * max_bs + 3,
                CAP,
                CAP + 1,
            ];
            for &len in &lengths {
                let p = plan(len, g, CAP);
                assert_eq!(p.group_size, gs);
                assert_eq!(p.block_size % gs, 0, "len={len} geom={g:?}");
                assert!(p.block_size <= max_bs, "len={len} geom={g:?}");
                assert!(p.block_size >= gs, "len={len} geom={g:?}");
            }
        }
    }

    #[test]
    fn test_plan_selection_rules() {
        let g = geom(4096, 4, 2, 0, 8); // gs = 16384, max = 49152
        assert_eq!(plan(1, &g, CAP).block_size, 16384);
        assert_eq!(plan(16384, &g, CAP).block_size, 16384);
        // mid-range rounds up to a power of two, group-aligned
        assert_eq!(plan(20000, &g, CAP).block_size, 32768);
        // at or above the max the block pins to the max
        assert_eq!(plan(49152, &g, CAP).block_size, 49152);
        assert_eq!(plan(1 << 30, &g, CAP).block_size, 49152);
    }

    #[test]
    fn test_plan_honors_cap() {
        let g = geom(65536, 8, 2, 2, 16); // max_block well above 1 MiB
        let p = plan(1 << 40, &g, 1 << 20);
        // candidate clamped to the cap before the comparison chain
        assert!(p.block_size <= g.max_block());
        assert_eq!(p.block_size % p.group_size, 0);
    }

    #[test]
    fn test_plan_power_of_two_rounding_odd_group() {
        // 3 data units: group size 12288 is not a power of two, so the
        // power-of-two branch must still come back group-aligned.
        let g = geom(4096, 3, 2, 1, 7);
        let p = plan(20000, &g, CAP);
        assert_eq!(p.block_size % 12288, 0);
        assert!(p.block_size >= 20000 || p.block_size == g.max_block());
    }
}
