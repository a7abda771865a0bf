//! Concurrency tokens
//!
//! A concurrency token is an opaque, server-assigned version marker carried by
//! every mergeable record. The store bumps it on each successful write, so two
//! images of the same record with equal tokens describe the same version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Opaque version marker compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcurrencyToken(Vec<u8>);

impl ConcurrencyToken {
    /// Wrap raw token bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Encode a row version as an 8-byte big-endian token
    pub fn from_u64(version: u64) -> Self {
        Self(version.to_be_bytes().to_vec())
    }

    /// Decode an 8-byte token back into a row version
    pub fn to_u64(&self) -> Option<u64> {
        <[u8; 8]>::try_from(self.0.as_slice())
            .ok()
            .map(u64::from_be_bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(hex_str)?))
    }

    /// Compare two tokens.
    ///
    /// Row versions are almost always 8 bytes wide, which compares as a
    /// single word.
    pub fn matches(&self, other: &ConcurrencyToken) -> bool {
        let (a, b) = (self.0.as_slice(), other.0.as_slice());
        if a.len() != b.len() {
            return false;
        }
        match (<[u8; 8]>::try_from(a), <[u8; 8]>::try_from(b)) {
            (Ok(x), Ok(y)) => u64::from_ne_bytes(x) == u64::from_ne_bytes(y),
            _ => a == b,
        }
    }
}

/// Compare two optional tokens: both absent is equal, one absent is not.
pub fn tokens_match(a: Option<&ConcurrencyToken>, b: Option<&ConcurrencyToken>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<u64> for ConcurrencyToken {
    fn from(version: u64) -> Self {
        Self::from_u64(version)
    }
}

impl Serialize for ConcurrencyToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ConcurrencyToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
