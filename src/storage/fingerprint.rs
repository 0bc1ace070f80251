//! CRC32 content fingerprints
//!
//! Every record file embeds the fingerprint of its body in its file name;
//! every read and every reconciliation pass recomputes it. CRC32 (IEEE
//! polynomial) is enough for corruption detection; this is not a security
//! boundary.

use crc32fast::Hasher;

/// Number of hex characters in a rendered fingerprint.
pub const FINGERPRINT_LEN: usize = 8;

/// Computes the fingerprint of a record body as lowercase hex.
///
/// Deterministic: the same input always produces the same output.
pub fn compute_fingerprint(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    format!("{:08x}", hasher.finalize())
}

/// Verifies that the computed fingerprint matches the expected one.
pub fn verify_fingerprint(data: &[u8], expected: &str) -> bool {
    compute_fingerprint(data) == expected
}

/// True if `s` is a well-formed rendered fingerprint.
pub fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
