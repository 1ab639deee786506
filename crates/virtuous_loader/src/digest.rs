//! SHA-256 content digests.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of hex characters in a digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Number of leading hex characters used for synthesized module names.
pub const SHORT_DIGEST_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Hash mismatch: expected {expected}, actual {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("Invalid hash format: {0}")]
    InvalidFormat(String),
}

/// Lowercase hex SHA-256 of a module's source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Full 64-character hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters used as the default module identifier.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_DIGEST_LEN]
    }

    /// Compares against an externally supplied digest, ignoring case.
    pub fn matches(&self, expected: &str) -> bool {
        self.0.eq_ignore_ascii_case(expected)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the digest of `bytes`.
pub fn digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest(hex::encode(hasher.finalize()))
}

/// Returns `true` if `value` looks like a SHA-256 hex digest.
pub fn is_valid_hex_digest(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Verifies that `bytes` hash to `expected`.
///
/// Returns the computed digest so callers do not hash twice.
pub fn verify(bytes: &[u8], expected: &str) -> Result<ContentDigest, IntegrityError> {
    if !is_valid_hex_digest(expected) {
        return Err(IntegrityError::InvalidFormat(expected.to_string()));
    }

    let actual = digest(bytes);
    verify_digest(&actual, expected)?;
    Ok(actual)
}

/// Compares an already computed digest against `expected`.
pub fn verify_digest(actual: &ContentDigest, expected: &str) -> Result<(), IntegrityError> {
    if !is_valid_hex_digest(expected) {
        return Err(IntegrityError::InvalidFormat(expected.to_string()));
    }

    if actual.matches(expected) {
        Ok(())
    } else {
        Err(IntegrityError::Mismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
