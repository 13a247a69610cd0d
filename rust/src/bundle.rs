//! Sealed dotenv bundles: dotenv text encrypted as a single envelope.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::crypto::envelope::{EnvelopeCodec, EnvelopeError};
use crate::dotenv::{self, ParseError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Decrypts `envelope` and parses the plaintext as dotenv text.
pub fn open(
    codec: &EnvelopeCodec,
    envelope: &str,
    key: &str,
) -> Result<BTreeMap<String, String>, BundleError> {
    let plaintext = codec.decrypt(envelope, key)?;
    let entries = dotenv::parse(&plaintext)?;
    debug!(entries = entries.len(), "opened sealed bundle");
    Ok(entries)
}

/// Serializes `entries` as dotenv text and encrypts the result.
pub fn seal<I, K, V>(codec: &EnvelopeCodec, entries: I, key: &str) -> Result<String, BundleError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let text = dotenv::stringify(entries);
    Ok(codec.encrypt(&text, key)?)
}
