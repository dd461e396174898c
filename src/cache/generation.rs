//! Cache generation naming.
//!
//! A generation pairs the running application's version tag with the cache
//! key derived from it. Exactly one generation is current per process; it is
//! built once at startup and handed to every component by reference.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default namespace prefix for cache keys.
pub const DEFAULT_NAMESPACE: &str = "app";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Version tag must not be empty")]
    EmptyVersion,

    #[error("Cache namespace must not be empty")]
    EmptyNamespace,
}

/// Identifier of "this build", taken from the application version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(version: impl Into<String>) -> Result<Self, GenerationError> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(GenerationError::EmptyVersion);
        }
        Ok(Self(version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a cache store: `<namespace>-v<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a namespace and version tag.
    pub fn derive(namespace: &str, tag: &VersionTag) -> Self {
        Self(format!("{namespace}-v{tag}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for CacheKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CacheKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The current build's version tag together with its cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    tag: VersionTag,
    key: CacheKey,
}

impl Generation {
    pub fn new(namespace: &str, tag: VersionTag) -> Result<Self, GenerationError> {
        if namespace.trim().is_empty() {
            return Err(GenerationError::EmptyNamespace);
        }
        let key = CacheKey::derive(namespace, &tag);
        Ok(Self { tag, key })
    }

    /// Convenience constructor from raw strings.
    pub fn from_version(namespace: &str, version: &str) -> Result<Self, GenerationError> {
        Self::new(namespace, VersionTag::new(version)?)
    }

    pub fn tag(&self) -> &VersionTag {
        &self.tag
    }

    /// The current generation's cache key.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Whether a store name belongs to this generation.
    pub fn owns(&self, store_name: &str) -> bool {
        self.key == store_name
    }
}
