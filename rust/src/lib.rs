//! Encrypted dotenv secrets. Configuration text is sealed into a versioned
//! ChaCha20-Poly1305 envelope and parsed back into key/value pairs at load
//! time, so plaintext secrets never need to live in version control.

pub mod bundle;
pub mod config;
pub mod crypto;
pub mod dotenv;

pub use crypto::attempts::{AttemptTracker, TrackerConfig};
pub use crypto::envelope::{
    inspect, key_fingerprint, CodecConfig, EnvelopeCodec, EnvelopeError, EnvelopeFormat,
    EnvelopeInfo,
};
pub use crypto::keys::{generate_key, SymmetricKey};
pub use dotenv::{parse, stringify, stringify_optional, ParseError};
