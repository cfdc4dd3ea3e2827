//! StripeIO Common - Shared types and utilities
//!
//! This crate provides the identifier types, error definitions, and
//! configuration structures used across all StripeIO components.

pub mod config;
pub mod error;
pub mod id;

pub use config::{EngineConfig, StoreConfig};
pub use error::{Error, Result};
pub use id::{IdParseError, ObjectId, PoolId, Uint128};
