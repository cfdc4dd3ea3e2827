//! Configuration types for StripeIO
//!
//! These structures are filled in by the consuming binaries (flags, files,
//! HTTP parameters); the engine only validates and uses them.

use crate::error::{Error, Result};
use crate::id::PoolId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cap on a single planned block (bounds per-iteration memory)
pub const DEFAULT_MAX_BLOCK_BYTES: u64 = 512 * 1024 * 1024;

/// Engine configuration shared by every handle opened through a session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of I/O slots, i.e. the bound on concurrently in-flight
    /// block operations per handle (default: 1, fully sequential)
    pub threads: usize,
    /// Maximum transfer unit for one planned block
    pub max_block_bytes: u64,
    /// Preferred pool for object creation (None = backend default)
    pub pool: Option<PoolId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            pool: None,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::allocation("thread count must be at least 1"));
        }
        if self.max_block_bytes == 0 {
            return Err(Error::allocation("max block size must be non-zero"));
        }
        Ok(())
    }
}

/// Configuration for the directory-backed reference store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding object data files and attribute sidecars
    pub data_dir: PathBuf,
    /// Pool this store answers for
    pub pool: PoolId,
    /// Data units per stripe (N)
    pub data_units: u32,
    /// Parity units per stripe (K)
    pub parity_units: u32,
    /// Spare units per stripe (S)
    pub spare_units: u32,
    /// Pool width (P), must be >= N + K + S
    pub pool_width: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/stripeio"),
            pool: PoolId::new(0x6f, 0x1),
            data_units: 4,
            parity_units: 2,
            spare_units: 0,
            pool_width: 8,
        }
    }
}

impl StoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_units == 0 {
            return Err(Error::allocation("data unit count must be at least 1"));
        }
        let group = self.data_units + self.parity_units + self.spare_units;
        if self.pool_width < group {
            return Err(Error::allocation(format!(
                "pool width {} is less than the parity group size {}",
                self.pool_width, group
            )));
        }
        Ok(())
    }
}
