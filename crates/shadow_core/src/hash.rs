//! SHA-256 hashing primitive.
//!
//! Fingerprints, policy snapshots, and decision ids all hash through this type
//! so any implementation with a canonical encoder and SHA-256 reproduces them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest length in bytes
    pub const LEN: usize = 32;

    /// SHA-256 of `data`
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Lower-case hex
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First `chars` hex characters of the digest
    ///
    /// `chars` is clamped to the full 64-character digest.
    #[must_use]
    pub fn truncated_hex(&self, chars: usize) -> String {
        let mut full = self.to_hex();
        full.truncate(chars.min(Self::LEN * 2));
        full
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hex SHA-256 of a UTF-8 string
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    Hash::compute(text.as_bytes()).to_hex()
}
