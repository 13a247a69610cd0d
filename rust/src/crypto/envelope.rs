//! Versioned envelope codec built on ChaCha20-Poly1305.
//!
//! New envelopes look like
//! `v1|<unix_ms>|<sha256(payload)>|<iv_hex>:<tag_hex>:<ciphertext_hex>`.
//! A bare `<iv_hex>:<tag_hex>:<ciphertext_hex>` payload is still accepted on
//! decrypt so secrets sealed before versioning keep working.
//!
//! Every failure past input validation collapses into
//! [`EnvelopeError::InvalidOrCorrupted`] with one fixed message. Callers must
//! not be able to tell a wrong key from a damaged envelope.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::attempts::{AttemptTracker, TrackerConfig};
use crate::crypto::integrity::{checksum_matches, payload_checksum};
use crate::crypto::keys::SymmetricKey;

/// Tag written at the front of every envelope this codec produces.
pub const VERSION_TAG: &str = "v1";
/// Nonce size in bytes (96 bits).
pub const IV_LEN: usize = 12;
/// Poly1305 tag size in bytes (128 bits).
pub const TAG_LEN: usize = 16;
/// Largest plaintext accepted by default (10 MiB).
pub const DEFAULT_MAX_PLAINTEXT_BYTES: usize = 10 * 1024 * 1024;

const VERSION_PREFIX: &str = "v1|";

/// Characters an envelope carries beyond the hex ciphertext: the version
/// prefix, the widest `u64` timestamp, the checksum, the hex IV and tag, and
/// the separators between them.
pub const FRAMING_OVERHEAD: usize =
    VERSION_PREFIX.len() + 20 + 1 + 64 + 1 + IV_LEN * 2 + 1 + TAG_LEN * 2 + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("input too large: {len} bytes exceeds limit of {max} bytes")]
    InputTooLarge { len: usize, max: usize },
    #[error("invalid key; expected 64 hex characters (32 bytes)")]
    InvalidKey,
    #[error("decryption failed: invalid key or corrupted data")]
    InvalidOrCorrupted,
    #[error("too many failed decryption attempts; try again later")]
    RateLimited,
}

/// Size limits applied by [`EnvelopeCodec`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum plaintext size in bytes. Envelopes may be twice this size plus
    /// [`FRAMING_OVERHEAD`], which is what the largest accepted plaintext
    /// seals to.
    pub max_plaintext_bytes: usize,
}

impl CodecConfig {
    pub fn max_envelope_bytes(&self) -> usize {
        self.max_plaintext_bytes
            .saturating_mul(2)
            .saturating_add(FRAMING_OVERHEAD)
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_plaintext_bytes: DEFAULT_MAX_PLAINTEXT_BYTES,
        }
    }
}

/// How an envelope was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    Versioned { created_at_ms: u64 },
    Legacy,
}

/// Structural facts about an envelope, available without the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeInfo {
    pub format: EnvelopeFormat,
    pub ciphertext_len: usize,
}

impl EnvelopeInfo {
    pub fn created_at_ms(&self) -> Option<u64> {
        match self.format {
            EnvelopeFormat::Versioned { created_at_ms } => Some(created_at_ms),
            EnvelopeFormat::Legacy => None,
        }
    }
}

/// Any structural or cryptographic failure. Always surfaced as
/// [`EnvelopeError::InvalidOrCorrupted`].
#[derive(Debug)]
struct Corrupted;

impl From<Corrupted> for EnvelopeError {
    fn from(_: Corrupted) -> Self {
        EnvelopeError::InvalidOrCorrupted
    }
}

/// Envelope framing, decided once by a prefix check.
enum WireEnvelope<'a> {
    Versioned {
        timestamp_ms: u64,
        checksum: &'a str,
        payload: &'a str,
    },
    Legacy {
        payload: &'a str,
    },
}

impl<'a> WireEnvelope<'a> {
    fn detect(text: &'a str) -> Result<Self, Corrupted> {
        if !text.starts_with(VERSION_PREFIX) {
            return Ok(WireEnvelope::Legacy { payload: text });
        }

        let fields: Vec<&str> = text.split('|').collect();
        let [version, timestamp, checksum, payload] = fields.as_slice() else {
            return Err(Corrupted);
        };
        if *version != VERSION_TAG {
            return Err(Corrupted);
        }
        let timestamp_ms = timestamp.parse::<u64>().map_err(|_| Corrupted)?;
        Ok(WireEnvelope::Versioned {
            timestamp_ms,
            checksum: *checksum,
            payload: *payload,
        })
    }

    /// Returns the payload once the versioned checksum (if any) has been verified.
    fn verified_payload(&self) -> Result<&'a str, Corrupted> {
        match self {
            WireEnvelope::Versioned {
                checksum, payload, ..
            } => {
                if checksum_matches(checksum, payload) {
                    Ok(*payload)
                } else {
                    Err(Corrupted)
                }
            }
            WireEnvelope::Legacy { payload } => Ok(*payload),
        }
    }

    fn format(&self) -> EnvelopeFormat {
        match self {
            WireEnvelope::Versioned { timestamp_ms, .. } => EnvelopeFormat::Versioned {
                created_at_ms: *timestamp_ms,
            },
            WireEnvelope::Legacy { .. } => EnvelopeFormat::Legacy,
        }
    }
}

/// Decoded `iv:tag:ciphertext` triple.
struct Payload {
    iv: [u8; IV_LEN],
    tag: [u8; TAG_LEN],
    ciphertext: Vec<u8>,
}

impl Payload {
    fn parse(text: &str) -> Result<Self, Corrupted> {
        let fields: Vec<&str> = text.split(':').collect();
        let [iv_hex, tag_hex, ciphertext_hex] = fields.as_slice() else {
            return Err(Corrupted);
        };

        let iv: [u8; IV_LEN] = hex::decode(iv_hex)
            .map_err(|_| Corrupted)?
            .try_into()
            .map_err(|_| Corrupted)?;
        let tag: [u8; TAG_LEN] = hex::decode(tag_hex)
            .map_err(|_| Corrupted)?
            .try_into()
            .map_err(|_| Corrupted)?;
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| Corrupted)?;

        Ok(Self {
            iv,
            tag,
            ciphertext,
        })
    }

    fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(self.tag),
            hex::encode(&self.ciphertext)
        )
    }
}

/// Encrypts and decrypts envelopes, consulting an [`AttemptTracker`] on every
/// decryption.
pub struct EnvelopeCodec {
    config: CodecConfig,
    tracker: Arc<AttemptTracker>,
}

impl EnvelopeCodec {
    /// Builds a codec with its own tracker.
    pub fn new(config: CodecConfig, tracker_config: TrackerConfig) -> Self {
        Self::with_tracker(config, Arc::new(AttemptTracker::new(tracker_config)))
    }

    /// Builds a codec that shares `tracker` with other codecs.
    pub fn with_tracker(config: CodecConfig, tracker: Arc<AttemptTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<AttemptTracker> {
        &self.tracker
    }

    /// Seals `plaintext` under a hex-encoded key. Each call draws a new IV, so
    /// repeated calls never return the same envelope.
    pub fn encrypt(&self, plaintext: &str, key: &str) -> Result<String, EnvelopeError> {
        let max = self.config.max_plaintext_bytes;
        if plaintext.len() > max {
            return Err(EnvelopeError::InputTooLarge {
                len: plaintext.len(),
                max,
            });
        }
        let key = parse_key(key)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| EnvelopeError::InvalidInput("plaintext could not be encrypted"))?;

        let tag_start = sealed
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(EnvelopeError::InvalidInput("sealed output shorter than tag"))?;
        let tag_bytes = sealed.split_off(tag_start);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&tag_bytes);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(nonce.as_slice());

        let payload = Payload {
            iv,
            tag,
            ciphertext: sealed,
        }
        .encode();
        let checksum = payload_checksum(&payload);
        Ok(format!(
            "{VERSION_TAG}|{}|{checksum}|{payload}",
            unix_millis()
        ))
    }

    /// Opens a versioned or legacy envelope.
    ///
    /// Fails with [`EnvelopeError::RateLimited`] before any cryptographic work
    /// when the key has too many recent failures. Every other failure after
    /// input validation is [`EnvelopeError::InvalidOrCorrupted`] and counts as a
    /// failed attempt for the key.
    pub fn decrypt(&self, envelope: &str, key: &str) -> Result<String, EnvelopeError> {
        if envelope.is_empty() {
            return Err(EnvelopeError::InvalidInput("envelope must not be empty"));
        }
        let max = self.config.max_envelope_bytes();
        if envelope.len() > max {
            return Err(EnvelopeError::InputTooLarge {
                len: envelope.len(),
                max,
            });
        }
        let key = parse_key(key)?;
        let fingerprint = key.fingerprint();

        if self.tracker.is_rate_limited(&fingerprint) {
            return Err(EnvelopeError::RateLimited);
        }

        match open(envelope, &key) {
            Ok(plaintext) => Ok(plaintext),
            Err(Corrupted) => {
                self.tracker.record_failure(&fingerprint);
                Err(EnvelopeError::InvalidOrCorrupted)
            }
        }
    }

    /// Resets the failure history for a key fingerprint (see [`key_fingerprint`]).
    pub fn clear_rate_limit(&self, key_hash: &str) -> bool {
        self.tracker.clear(key_hash)
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(CodecConfig::default(), TrackerConfig::default())
    }
}

/// Fingerprint under which failed attempts for `key` are tracked.
pub fn key_fingerprint(key: &str) -> Result<String, EnvelopeError> {
    Ok(parse_key(key)?.fingerprint())
}

/// Decodes envelope framing without a key. Useful for age checks; it proves
/// nothing about authenticity.
pub fn inspect(envelope: &str) -> Result<EnvelopeInfo, EnvelopeError> {
    if envelope.is_empty() {
        return Err(EnvelopeError::InvalidInput("envelope must not be empty"));
    }
    let wire = WireEnvelope::detect(envelope)?;
    let payload = Payload::parse(wire.verified_payload()?)?;
    Ok(EnvelopeInfo {
        format: wire.format(),
        ciphertext_len: payload.ciphertext.len(),
    })
}

fn parse_key(key: &str) -> Result<SymmetricKey, EnvelopeError> {
    SymmetricKey::from_hex(key).map_err(|_| EnvelopeError::InvalidKey)
}

fn open(envelope: &str, key: &SymmetricKey) -> Result<String, Corrupted> {
    let wire = WireEnvelope::detect(envelope)?;
    let payload = Payload::parse(wire.verified_payload()?)?;

    let mut sealed = Vec::with_capacity(payload.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&payload.ciphertext);
    sealed.extend_from_slice(&payload.tag);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&payload.iv), sealed.as_slice())
        .map_err(|_| Corrupted)?;

    String::from_utf8(plaintext).map_err(|err| {
        let mut bytes = err.into_bytes();
        bytes.zeroize();
        Corrupted
    })
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
