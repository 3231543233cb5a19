use crate::error::ShortenerError;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The identifier of a shortened URL.
///
/// Derived identifiers are the lowercase hex MD5 digest of the original URL.
/// Identifiers supplied by callers (batch correlation ids, request paths) must
/// be 1-256 characters of `[a-zA-Z0-9_-]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlHash(String);

const MIN_LENGTH: usize = 1;
const MAX_LENGTH: usize = 256;

impl UrlHash {
    /// Creates a new `UrlHash` after validating the input.
    pub fn new(hash: impl Into<String>) -> std::result::Result<Self, ShortenerError> {
        let hash = hash.into();
        Self::validate(&hash)?;
        Ok(Self(hash))
    }

    /// Creates a `UrlHash` without validation.
    ///
    /// Use this only for values produced by [`derive`] or read back from a
    /// storage tier that only ever stored validated hashes.
    pub fn new_unchecked(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(hash: &str) -> std::result::Result<(), ShortenerError> {
        if hash.len() < MIN_LENGTH || hash.len() > MAX_LENGTH {
            return Err(ShortenerError::InvalidHash(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                hash.len()
            )));
        }

        if !hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShortenerError::InvalidHash(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                hash
            )));
        }

        Ok(())
    }
}

impl Display for UrlHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The output of [`derive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub hash: UrlHash,
    pub short_url: String,
}

/// Derives the content-addressed identifier and short URL for `original_url`.
///
/// The same input always yields the same hash, which is what makes repeated
/// shortening of one URL land on one record.
pub fn derive(original_url: &str, base_url: &str) -> Derived {
    let digest = Md5::digest(original_url.as_bytes());
    let hash = UrlHash(format!("{:x}", digest));
    let short_url = hash.to_url(base_url);
    Derived { hash, short_url }
}
