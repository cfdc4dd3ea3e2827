//! Storage layout geometry
//!
//! The layout geometry describes how an object's bytes are striped across
//! the devices of its pool: the stripe unit size and the data/parity/spare
//! unit counts. It is resolved once per handle at open/create time and
//! cached for the handle's lifetime.

use crate::backend::{BackendObject, StoreBackend};
use stripeio_common::{Error, Result};

/// Smallest supported layout id
pub const MIN_LAYOUT_ID: u64 = 1;

/// Largest supported layout id
pub const MAX_LAYOUT_ID: u64 = 14;

/// Unit size of the smallest layout (layout id 1)
pub const MIN_UNIT_SIZE: u64 = 4096;

/// Stripe parameters governing how an object's bytes are split across
/// storage devices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutGeometry {
    /// Stripe unit size in bytes
    pub unit_size: u64,
    /// Data units per parity group (N)
    pub data_units: u32,
    /// Parity units per parity group (K)
    pub parity_units: u32,
    /// Spare units per parity group (S)
    pub spare_units: u32,
    /// Pool width (P)
    pub pool_width: u32,
}

impl LayoutGeometry {
    /// Bytes spanned by one full stripe across the data units only
    #[must_use]
    pub const fn group_size(&self) -> u64 {
        self.unit_size * self.data_units as u64
    }

    /// Units in one parity group (N + K + S)
    #[must_use]
    pub const fn group_units(&self) -> u32 {
        self.data_units + self.parity_units + self.spare_units
    }

    /// Largest block one dispatch may carry: roughly two pool widths deep,
    /// rounded up to a whole number of groups. Deeper requests risk
    /// oversize-request failures from the backend.
    #[must_use]
    pub const fn max_block(&self) -> u64 {
        let gs = self.group_size();
        let raw = self.unit_size * 2 * self.pool_width as u64 * self.data_units as u64
            / self.group_units() as u64;
        raw.div_ceil(gs) * gs
    }

    fn check(&self, layout: u64) -> Result<()> {
        if self.data_units == 0 || self.unit_size == 0 {
            return Err(Error::layout_not_found(layout, "degenerate stripe geometry"));
        }
        if (self.pool_width as u64) < self.group_units() as u64 {
            return Err(Error::layout_not_found(
                layout,
                format!(
                    "pool width {} is less than the parity group size {}",
                    self.pool_width,
                    self.group_units()
                ),
            ));
        }
        Ok(())
    }
}

/// Stripe unit size bound to a layout id, or None if the id is out of range
#[must_use]
pub const fn unit_size_for(layout: u64) -> Option<u64> {
    if layout < MIN_LAYOUT_ID || layout > MAX_LAYOUT_ID {
        return None;
    }
    Some(MIN_UNIT_SIZE << (layout - 1))
}

/// Pick the layout id best suited to an object of the given estimated size.
///
/// Aims for one stripe unit per data device of roughly `size_hint / n`
/// bytes, so small objects get small units (no wasted space) and large
/// objects get large units (fewer, bigger device operations).
#[must_use]
pub fn layout_for_size(size_hint: u64, data_units: u32) -> u64 {
    let per_unit = (size_hint / u64::from(data_units.max(1))).max(MIN_UNIT_SIZE);
    let mut layout = MIN_LAYOUT_ID;
    while layout < MAX_LAYOUT_ID {
        match unit_size_for(layout + 1) {
            Some(unit) if unit <= per_unit => layout += 1,
            _ => break,
        }
    }
    layout
}

/// Resolve the geometry bound to the handle's layout id.
///
/// Fails with `LayoutNotFound` when the backend has no matching pool
/// version or the reported geometry violates the pool-width invariant.
/// This is fatal for the handle; it cannot be used for chunked I/O.
pub async fn resolve(backend: &dyn StoreBackend, obj: &BackendObject) -> Result<LayoutGeometry> {
    let geom = backend.resolve_geometry(obj).await?;
    geom.check(obj.layout)?;
    Ok(geom)
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_group_size() {
        assert_eq!(geom(4096, 4, 2, 0, 8).group_size(), 16384);
        assert_eq!(geom(16384, 1, 0, 0, 1).group_size(), 16384);
    }

    #[test]
    fn test_max_block_is_group_multiple() {
        for g in [
            geom(4096, 4, 2, 0, 8),
            geom(4096, 3, 2, 1, 7),
            geom(65536, 8, 2, 2, 16),
            geom(4096, 1, 0, 0, 1),
        ] {
            let mb = g.max_block();
            assert!(mb >= g.group_size());
            assert_eq!(mb % g.group_size(), 0);
        }
    }

    #[test]
    fn test_max_block_value() {
        // unit 4K, 4+2 over 8 devices: 4096 * 2 * 8 * 4 / 6 = 43690,
        // rounded up to the 16K group boundary.
        assert_eq!(geom(4096, 4, 2, 0, 8).max_block(), 49152);
    }

    #[test]
    fn test_unit_size_for() {
        assert_eq!(unit_size_for(0), None);
        assert_eq!(unit_size_for(1), Some(4096));
        assert_eq!(unit_size_for(4), Some(32768));
        assert_eq!(unit_size_for(14), Some(4096 << 13));
        assert_eq!(unit_size_for(15), None);
    }

    #[test]
    fn test_layout_for_size() {
        assert_eq!(layout_for_size(0, 4), 1);
        assert_eq!(layout_for_size(4096, 4), 1);
        // 1 MiB over 4 data units: 256K per unit -> layout 7
        assert_eq!(layout_for_size(1 << 20, 4), 7);
        // huge objects saturate at the largest layout
        assert_eq!(layout_for_size(1 << 62, 4), MAX_LAYOUT_ID);
    }

    #[test]
    fn test_narrow_pool_rejected() {
        let g = geom(4096, 4, 2, 0, 5);
        assert!(matches!(
            g.check(1),
            Err(stripeio_common::Error::LayoutNotFound { .. })
        ));
    }
}
