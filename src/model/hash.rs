//! Node hashes
//!
//! A node is identified by the BLAKE3 digest of its canonical encoding, so
//! the same content always lands under the same key in the dirty table,
//! the clean cache and the persistent store.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const HASH_LENGTH: usize = 32;

/// Digest of a node encoding. Doubles as the store key of the node.
///
/// [`Hash::ZERO`] is not the digest of anything. The memory database
/// keys its meta-root by it and uses it to terminate the flush list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    /// Interpret a store key as a hash. `None` unless it is 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; HASH_LENGTH]>::try_from(bytes).ok().map(Hash)
    }

    pub fn digest(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Digest of the concatenation of `parts`
    pub fn digest_many(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex digits. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        Hash::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    /// First 8 hex digits, enough to tell nodes apart in logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("Hash(meta-root)")
        } else {
            write!(f, "Hash({})", self.short())
        }
    }
}
