//! JSON configuration for the codec, the attempt tracker and the key source.
//! Every section is optional; missing fields fall back to the documented
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::attempts::TrackerConfig;
use crate::crypto::envelope::{CodecConfig, EnvelopeCodec};
use crate::crypto::keys::SymmetricKey;

/// Environment variable consulted when no key source is configured.
pub const DEFAULT_KEY_ENV: &str = "ENVSEAL_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("no usable key source configured")]
    MissingKeySource,
    #[error("key source unreadable: {0}")]
    KeySource(String),
    #[error("key from {0} is not 64 hex characters")]
    InvalidKey(String),
}

/// Where the hex-encoded key comes from. The environment variable wins when
/// both are set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeySourceConfig {
    /// Environment variable that holds the 64-character hex key.
    pub key_env: Option<String>,
    /// File that holds the hex key; surrounding whitespace is ignored.
    pub key_path: Option<PathBuf>,
}

impl KeySourceConfig {
    /// Reads and validates the key. Returns it in hex form.
    pub fn resolve(&self) -> Result<String, ConfigError> {
        if let Some(var) = &self.key_env {
            let value = std::env::var(var)
                .map_err(|e| ConfigError::KeySource(format!("{var}: {e}")))?;
            return validate_key(value.trim(), var);
        }
        if let Some(path) = &self.key_path {
            let content = fs::read_to_string(path)
                .map_err(|e| ConfigError::KeySource(format!("{}: {e}", path.display())))?;
            return validate_key(content.trim(), &path.display().to_string());
        }
        Err(ConfigError::MissingKeySource)
    }
}

fn validate_key(hex_key: &str, source: &str) -> Result<String, ConfigError> {
    SymmetricKey::from_hex(hex_key)
        .map(|key| key.to_hex())
        .map_err(|_| ConfigError::InvalidKey(source.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvsealConfig {
    pub key: KeySourceConfig,
    pub codec: CodecConfig,
    pub rate_limit: TrackerConfig,
}

impl EnvsealConfig {
    /// Configuration used when no file is given: defaults everywhere and the
    /// key read from [`DEFAULT_KEY_ENV`].
    pub fn from_env_defaults() -> Self {
        Self {
            key: KeySourceConfig {
                key_env: Some(DEFAULT_KEY_ENV.to_string()),
                key_path: None,
            },
            ..Self::default()
        }
    }

    pub fn build_codec(&self) -> EnvelopeCodec {
        EnvelopeCodec::new(self.codec.clone(), self.rate_limit.clone())
    }
}

/// Loads the JSON configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EnvsealConfig, ConfigError> {
    let raw_json = fs::read_to_string(&path).map_err(|e| ConfigError::Io(format!("{e}")))?;
    serde_json::from_str(&raw_json).map_err(|e| ConfigError::Parse(format!("{e}")))
}
