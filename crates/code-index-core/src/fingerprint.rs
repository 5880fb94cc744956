//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's raw bytes. It is
//! computed over bytes rather than decoded text so that any change,
//! whitespace included, produces a different fingerprint. Modification
//! times are never consulted.

use sha2::{Digest, Sha256};

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
