//! Cache storage abstraction.
//!
//! A [`CacheStorage`] is a namespace of named [`CacheStore`]s, each mapping
//! request identities to stored responses. Several stores may coexist; the
//! lifecycle code decides which one is current.
//!
//! [`MemoryCacheStorage`] keeps everything in process memory and is used by
//! tests and embedders that do not need durability. The on-disk backend lives
//! in [`crate::cache::disk`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::cache::entry::{AssetResponse, RequestKey};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Entry metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Invalid store name: {0:?}")]
    InvalidName(String),

    #[error("Corrupt cache entry at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Reject names that cannot be used as a single path component.
pub fn validate_store_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A single named collection of request → response entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name this store was opened under.
    fn name(&self) -> &str;

    /// Look up the stored response for a request identity.
    async fn match_request(&self, key: &RequestKey) -> Result<Option<AssetResponse>, StoreError>;

    /// Store (or replace) the response for a request identity.
    async fn put(&self, key: &RequestKey, response: &AssetResponse) -> Result<(), StoreError>;

    /// All request identities currently stored.
    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.keys().await?.len())
    }
}

/// The namespace of all cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Store: CacheStore;

    /// Open the named store, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Store, StoreError>;

    /// Whether a store with this name exists.
    async fn has(&self, name: &str) -> Result<bool, StoreError>;

    /// Names of all existing stores.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a store and all its entries. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Look up a request in the named store without creating the store.
    async fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, StoreError> {
        if !self.has(name).await? {
            return Ok(None);
        }
        self.open(name).await?.match_request(key).await
    }
}

type Entries = Arc<RwLock<BTreeMap<RequestKey, AssetResponse>>>;

/// In-memory cache storage. Clones share the same stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    stores: Arc<RwLock<BTreeMap<String, Entries>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle to one in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    name: String,
    entries: Entries,
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<AssetResponse>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &RequestKey, response: &AssetResponse) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Store = MemoryCacheStore;

    async fn open(&self, name: &str) -> Result<MemoryCacheStore, StoreError> {
        validate_store_name(name)?;
        let entries = self
            .stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(MemoryCacheStore {
            name: name.to_string(),
            entries,
        })
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, StoreError> {
        let entries = match self.stores.read().await.get(name) {
            Some(entries) => entries.clone(),
            None => return Ok(None),
        };
        let hit = entries.read().await.get(key).cloned();
        Ok(hit)
    }
}
