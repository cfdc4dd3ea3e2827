//! Identifier types for StripeIO
//!
//! Objects and pools are addressed by 128-bit identifiers written as a
//! `hi:lo` pair of hexadecimal tokens (a leading `0x` on either half is
//! accepted). Identifiers are validated up front so that a malformed token
//! is rejected before any device access is attempted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 128-bit identifier expressed as a (hi, lo) pair of 64-bit words
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uint128 {
    /// High 64 bits
    pub hi: u64,
    /// Low 64 bits
    pub lo: u64,
}

impl Uint128 {
    /// Create an identifier from its two halves
    #[must_use]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Check whether both halves are zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }
}

fn parse_half(s: &str) -> Result<u64, IdParseError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return Err(IdParseError::Empty);
    }
    u64::from_str_radix(digits, 16).map_err(|_| IdParseError::InvalidHex(s.to_string()))
}

impl FromStr for Uint128 {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdParseError::Empty);
        }
        let (hi, lo) = s.split_once(':').ok_or(IdParseError::MissingSeparator)?;
        if lo.contains(':') {
            return Err(IdParseError::TrailingGarbage);
        }
        Ok(Self {
            hi: parse_half(hi)?,
            lo: parse_half(lo)?,
        })
    }
}

impl fmt::Display for Uint128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.hi, self.lo)
    }
}

impl fmt::Debug for Uint128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uint128({self})")
    }
}

/// Errors that can occur when parsing a 128-bit identifier token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier must be a hi:lo pair")]
    MissingSeparator,
    #[error("identifier has more than one separator")]
    TrailingGarbage,
    #[error("invalid hexadecimal token: {0:?}")]
    InvalidHex(String),
}

/// Unique identifier for an object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(Uint128);

impl ObjectId {
    /// Create an object id from its two halves
    #[must_use]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self(Uint128::new(hi, lo))
    }

    /// Get the underlying 128-bit pair
    #[must_use]
    pub const fn as_u128_pair(&self) -> Uint128 {
        self.0
    }
}

impl From<Uint128> for ObjectId {
    fn from(id: Uint128) -> Self {
        Self(id)
    }
}

impl FromStr for ObjectId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Uint128>().map(Self)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

/// Identifier of the pool an object is striped across
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(Uint128);

impl PoolId {
    /// Create a pool id from its two halves
    #[must_use]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self(Uint128::new(hi, lo))
    }

    /// Get the underlying 128-bit pair
    #[must_use]
    pub const fn as_u128_pair(&self) -> Uint128 {
        self.0
    }
}

impl From<Uint128> for PoolId {
    fn from(id: Uint128) -> Self {
        Self(id)
    }
}

impl FromStr for PoolId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Uint128>().map(Self)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_hex() {
        let id: Uint128 = "1234:abcd".parse().unwrap();
        assert_eq!(id, Uint128::new(0x1234, 0xabcd));
    }

    #[test]
    fn test_parse_prefixed_hex() {
        let id: Uint128 = "0x1234:0xABCD".parse().unwrap();
        assert_eq!(id, Uint128::new(0x1234, 0xabcd));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!("".parse::<Uint128>(), Err(IdParseError::Empty));
        assert_eq!("1234".parse::<Uint128>(), Err(IdParseError::MissingSeparator));
        assert_eq!("1:2:3".parse::<Uint128>(), Err(IdParseError::TrailingGarbage));
        assert_eq!("0x:1".parse::<Uint128>(), Err(IdParseError::Empty));
        assert!(matches!(
            "12g4:1".parse::<Uint128>(),
            Err(IdParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let id = ObjectId::new(0xdead, 0xbeef);
        assert_eq!(id.to_string(), "0xdead:0xbeef");
        assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);
    }
}
