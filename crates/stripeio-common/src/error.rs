//! Error types for StripeIO
//!
//! This module defines the common error taxonomy used throughout the
//! system. Reads that start at or beyond the known object size are not an
//! error; they surface as a zero byte count from the read paths.

use crate::id::{IdParseError, ObjectId, PoolId};
use thiserror::Error;

/// Common result type for StripeIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for StripeIO
#[derive(Debug, Error)]
pub enum Error {
    // Identifier errors
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdParseError),

    // Handle lifecycle errors
    #[error("object {0} is already open")]
    AlreadyOpen(ObjectId),

    #[error("object is not open")]
    NotOpen,

    #[error("object {object} exists in pool {actual}, not in requested pool {requested}")]
    PoolMismatch {
        object: ObjectId,
        requested: PoolId,
        actual: PoolId,
    },

    // Layout errors
    #[error("no pool version found for layout {layout}: {reason}")]
    LayoutNotFound { layout: u64, reason: String },

    // Resource errors
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    // Device errors
    #[error("{op} failed at extent [{offset}, +{len}): {source}")]
    DeviceOp {
        op: &'static str,
        offset: u64,
        len: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("device operation failed: code {0}")]
    DeviceCode(i32),

    // Stream errors
    #[error("invalid seek: {0}")]
    InvalidSeek(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    // Backend/plumbing errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an allocation failure
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::AllocationFailed(msg.into())
    }

    /// Create an invalid seek error
    pub fn invalid_seek(msg: impl Into<String>) -> Self {
        Self::InvalidSeek(msg.into())
    }

    /// Create a not-supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create a layout lookup failure
    pub fn layout_not_found(layout: u64, reason: impl Into<String>) -> Self {
        Self::LayoutNotFound {
            layout,
            reason: reason.into(),
        }
    }

    /// Tag an error with the extent of the device operation that produced it
    #[must_use]
    pub fn at_extent(self, op: &'static str, offset: u64, len: u64) -> Self {
        Self::DeviceOp {
            op,
            offset,
            len,
            source: Box::new(self),
        }
    }

    /// Check if this error came from a dispatched device operation
    #[must_use]
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::DeviceOp { .. } | Self::DeviceCode(_))
    }

    /// Check if this error is fatal for the handle that produced it
    #[must_use]
    pub fn is_fatal_for_handle(&self) -> bool {
        matches!(self, Self::LayoutNotFound { .. } | Self::NotOpen)
    }
}
