//! SHA-256 digest helpers.

use sha2::{Digest, Sha256};

/// Algorithm label used in prefixed digests.
pub const SHA256_PREFIX: &str = "sha256";

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest in `sha256:<hex>` form.
pub fn prefixed_sha256(data: &[u8]) -> String {
    format!("{}:{}", SHA256_PREFIX, sha256_hex(data))
}
