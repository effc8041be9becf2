//! Application bundle
//!
//! A bundle is the packaged application submitted with a run. Its content is
//! opaque to the exec server: it is stored content-addressed by its BLAKE3
//! digest and handed unchanged to the runner that executes the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packaged application artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Hex digest of `content`; may be empty, in which case the server fills it
    #[serde(default)]
    pub hash_str: String,
    /// Raw bundle bytes, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("bundle content is empty")]
    Empty,

    #[error("bundle hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },
}

/// Compute the content digest used to address bundles
pub fn hash_bundle(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

impl Bundle {
    /// Create a bundle from raw bytes, computing its hash
    pub fn new(content: Vec<u8>) -> Self {
        let hash_str = hash_bundle(&content);
        Self { hash_str, content }
    }

    /// Check the bundle is non-empty and that a declared hash matches the content
    ///
    /// Returns the computed hash.
    pub fn verify(&self) -> Result<String, BundleError> {
        if self.content.is_empty() {
            return Err(BundleError::Empty);
        }

        let computed = hash_bundle(&self.content);
        if !self.hash_str.is_empty() && !self.hash_str.eq_ignore_ascii_case(&computed) {
            return Err(BundleError::HashMismatch {
                declared: self.hash_str.clone(),
                computed,
            });
        }

        Ok(computed)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
