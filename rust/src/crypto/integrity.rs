//! Digest helpers shared by the envelope codec and the attempt tracker. The
//! envelope checksum and the key fingerprint are both plain SHA-256 so they can
//! be recomputed by any tool that understands the wire format.

use sha2::{Digest, Sha256};

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Returns the lowercase hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

/// Checksum stored in versioned envelopes. Computed over the textual payload
/// (`iv:tag:ciphertext`) rather than the decoded bytes.
pub fn payload_checksum(payload: &str) -> String {
    sha256_hex(payload.as_bytes())
}

/// Compares a stored checksum against the recomputed one. Hex case is ignored
/// so hand-edited envelopes with uppercase digests still verify.
pub fn checksum_matches(stored: &str, payload: &str) -> bool {
    let expected = payload_checksum(payload);
    stored.len() == expected.len() && stored.eq_ignore_ascii_case(&expected)
}
