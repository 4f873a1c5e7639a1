use sha2::{Digest, Sha256};

/// SHA-256 of the exact document bytes, as lowercase hex.
///
/// Identity is byte-level: whitespace or key-order changes produce a new
/// fingerprint even when the parsed document is the same.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
