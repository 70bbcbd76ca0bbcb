//! Fixed-size byte newtypes shared across modules.
//!
//! All of them travel as lowercase hex strings in JSON.

use crate::constants::{HASH_LEN, IV_LEN, KEY_LEN};
use crate::errors::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Decode exactly `N` bytes from hex, with or without a `0x` prefix.
pub(crate) fn decode_fixed_hex<const N: usize>(s: &str, what: &str) -> CoreResult<[u8; N]> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.len() != N * 2 {
        return Err(CoreError::InvalidInput(format!(
            "{what} must be {} hex characters, got {}",
            N * 2,
            digits.len()
        )));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| CoreError::InvalidInput(format!("{what} is not valid hex: {e}")))?;
    Ok(out)
}

/// A Keccak-256 digest: a leaf, an internal node or a root.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash32(pub [u8; HASH_LEN]);

impl Hash32 {
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        decode_fixed_hex::<HASH_LEN>(s, "hash").map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `0x`-prefixed form, as the verifier contract expects `bytes32` values.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 256-bit AES key.
///
/// `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(pub [u8; KEY_LEN]);

impl Key {
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        decode_fixed_hex::<KEY_LEN>(s, "key").map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

/// A 128-bit initialization vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv(pub [u8; IV_LEN]);

impl Iv {
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        decode_fixed_hex::<IV_LEN>(s, "iv").map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", self.to_hex())
    }
}
