//! Transfer identifiers
//!
//! Identifiers are the only capability a downloader needs, so they must be
//! unguessable. Each one is 128 bits from the OS CSPRNG. No uniqueness check
//! is made against the store: with `n` live transfers the chance of any
//! collision is roughly `n² / 2¹²⁹`, which stays below 10⁻²⁴ even for a
//! million concurrent uploads.

use crate::error::{Result, StoreError};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier length in bytes
pub const ID_LEN: usize = 16;

/// Opaque identifier naming one in-flight transfer
///
/// Displayed and serialized as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId([u8; ID_LEN]);

impl TransferId {
    /// Generate a fresh random identifier
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntropyUnavailable`] if the OS randomness source
    /// fails. Callers must not retry silently.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; ID_LEN];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Build an identifier from raw bytes
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", hex::encode(&self.0[..4]))
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Error type for parsing hex-encoded identifiers
#[derive(Debug, thiserror::Error)]
pub enum ParseIdError {
    /// Invalid hexadecimal encoding
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Decoded to the wrong number of bytes
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected number of bytes
        expected: usize,
        /// Actual number of bytes
        actual: usize,
    },
}

impl FromStr for TransferId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let actual = bytes.len();
        let bytes: [u8; ID_LEN] = bytes
            .try_into()
            .map_err(|_| ParseIdError::InvalidLength {
                expected: ID_LEN,
                actual,
            })?;
        Ok(Self(bytes))
    }
}

/// Generate a random on-disk name for uploaded bytes
///
/// Kept separate from [`TransferId`] so the public identifier never appears in
/// the storage directory.
///
/// # Errors
///
/// Returns [`StoreError::EntropyUnavailable`] if the OS randomness source fails.
pub fn storage_key() -> Result<String> {
    let mut bytes = [0u8; ID_LEN];
    fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf).map_err(|e| StoreError::EntropyUnavailable(e.to_string()))
}
