//! Durable cache storage on the local filesystem.
//!
//! Each store is a directory under the storage root. An entry is a pair of
//! files named after the SHA-256 of its request identity:
//!
//! ```text
//! <root>/<store-name>/<digest>.json   # method, url, status, headers
//! <root>/<store-name>/<digest>.body   # response body
//! ```
//!
//! Both files are written to a temporary name and renamed into place, body
//! first, so a present `.json` always has its body next to it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::cache::entry::{AssetResponse, RequestKey};
use crate::cache::store::{validate_store_name, CacheStorage, CacheStore, StoreError};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// On-disk metadata for one entry.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
}

/// Cache storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Create the storage, ensuring the root directory exists.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn store_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_store_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Handle to one store directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    name: String,
    dir: PathBuf,
}

fn entry_digest(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_bytes());
    hasher.update(b" ");
    hasher.update(key.url.as_bytes());
    hex::encode(hasher.finalize())
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl DiskCacheStore {
    fn entry_paths(&self, key: &RequestKey) -> (PathBuf, PathBuf) {
        let digest = entry_digest(key);
        (
            self.dir.join(format!("{digest}.{META_EXT}")),
            self.dir.join(format!("{digest}.{BODY_EXT}")),
        )
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<AssetResponse>, StoreError> {
        let (meta_path, body_path) = self.entry_paths(key);

        let raw = match fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_slice(&raw)?;

        // Digest collision or a hand-edited file.
        if meta.method != key.method || meta.url != key.url {
            return Err(StoreError::Corrupt {
                path: meta_path,
                reason: format!("entry belongs to {} {}", meta.method, meta.url),
            });
        }

        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Corrupt {
                    path: body_path,
                    reason: "body file missing".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        debug!(store = %self.name, key = %key, size = body.len(), "Read cache entry");

        Ok(Some(AssetResponse {
            status: meta.status,
            headers: meta.headers,
            body: body.into(),
        }))
    }

    async fn put(&self, key: &RequestKey, response: &AssetResponse) -> Result<(), StoreError> {
        let (meta_path, body_path) = self.entry_paths(key);
        let meta = EntryMeta {
            method: key.method.clone(),
            url: key.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
        };

        write_atomic(&body_path, &response.body).await?;
        write_atomic(&meta_path, &serde_json::to_vec(&meta)?).await?;

        debug!(
            store = %self.name,
            key = %key,
            path = %meta_path.display(),
            size = response.body.len(),
            "Wrote cache entry"
        );
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            let meta: EntryMeta = serde_json::from_slice(&fs::read(&path).await?)?;
            keys.push(RequestKey {
                method: meta.method,
                url: meta.url,
            });
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Store = DiskCacheStore;

    async fn open(&self, name: &str) -> Result<DiskCacheStore, StoreError> {
        let dir = self.store_path(name)?;
        fs::create_dir_all(&dir).await?;
        Ok(DiskCacheStore {
            name: name.to_string(),
            dir,
        })
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.store_path(name)?;
        match fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.metadata().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.store_path(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(store = name, path = %dir.display(), "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // A missing store directory reads as a miss, so no directory is created.
    async fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, StoreError> {
        let store = DiskCacheStore {
            name: name.to_string(),
            dir: self.store_path(name)?,
        };
        store.match_request(key).await
    }
}
