//! Symmetric key handling. Keys travel as 64-character hex strings and only
//! exist as raw bytes inside [`SymmetricKey`], which zeroes them on drop.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::crypto::integrity::sha256_hex;

/// Key size for ChaCha20-Poly1305.
pub const KEY_LEN: usize = 32;

/// Returned when a hex string does not decode to exactly [`KEY_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidKeyMaterial;

/// A 256-bit key held in memory for the duration of a single codec call.
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Generates a fresh key from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decodes a case-insensitive hex key. Surrounding whitespace is rejected
    /// rather than trimmed so that a copy/paste mistake surfaces early.
    pub fn from_hex(encoded: &str) -> Result<Self, InvalidKeyMaterial> {
        let mut decoded = hex::decode(encoded).map_err(|_| InvalidKeyMaterial)?;
        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return Err(InvalidKeyMaterial);
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// One-way identifier for this key, used to index failed attempts without
    /// keeping key material around.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.bytes)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Generates a new key and returns its hex form.
pub fn generate_key() -> String {
    SymmetricKey::generate().to_hex()
}

#[cfg(test)]
mod tests {
    use super::{generate_key, SymmetricKey, KEY_LEN};

    #[test]
    fn generated_keys_are_64_hex_chars() {
        let key = generate_key();
        assert_eq!(key.len(), KEY_LEN * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_key());
    }

    #[test]
    fn decodes_hex_case_insensitively() {
        let lower = "ab".repeat(KEY_LEN);
        let upper = lower.to_ascii_uppercase();
        let a = SymmetricKey::from_hex(&lower).expect("lowercase key");
        let b = SymmetricKey::from_hex(&upper).expect("uppercase key");
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rejects_wrong_lengths_and_bad_hex() {
        assert!(SymmetricKey::from_hex(&"00".repeat(16)).is_err());
        assert!(SymmetricKey::from_hex(&"00".repeat(33)).is_err());
        assert!(SymmetricKey::from_hex(&"zz".repeat(32)).is_err());
        assert!(SymmetricKey::from_hex("").is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = SymmetricKey::generate();
        assert_eq!(format!("{key:?}"), "SymmetricKey([REDACTED])");
    }
}
