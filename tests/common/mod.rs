//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use asset_cache_agent::cache::entry::{AssetRequest, AssetResponse, RequestKey};
use asset_cache_agent::cache::generation::Generation;
use asset_cache_agent::cache::store::{
    CacheStorage, MemoryCacheStorage, MemoryCacheStore, StoreError,
};
use asset_cache_agent::lifecycle::agent::Agent;
use asset_cache_agent::lifecycle::manifest::AssetManifest;
use asset_cache_agent::network::static_routes::StaticNetwork;
use asset_cache_agent::network::{Network, NetworkError};

pub const SCOPE: &str = "http://app.test/editor/";

pub fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
}

pub fn url(path: &str) -> String {
    scope().join(path).unwrap().to_string()
}

pub fn key(path: &str) -> RequestKey {
    RequestKey::resolve("GET", &scope(), path).unwrap()
}

pub fn generation(version: &str) -> Generation {
    Generation::from_version("app", version).unwrap()
}

/// A network that serves every entry of `manifest` with a 200.
pub fn serving(manifest: &AssetManifest) -> StaticNetwork {
    let net = StaticNetwork::new();
    for path in manifest.iter() {
        net.route(url(path), AssetResponse::new(200, format!("body of {path}")));
    }
    net
}

pub fn agent<S: CacheStorage>(
    version: &str,
    manifest: AssetManifest,
    storage: S,
    network: StaticNetwork,
) -> Agent<S, StaticNetwork> {
    Agent::new(generation(version), scope(), manifest, storage, network).unwrap()
}

/// In-memory storage with injectable failures.
#[derive(Debug, Clone, Default)]
pub struct FlakyStorage {
    pub inner: MemoryCacheStorage,
    pub fail_open: bool,
    pub fail_keys: bool,
    pub fail_lookup: bool,
    pub fail_delete: HashSet<String>,
}

impl FlakyStorage {
    pub fn new(inner: MemoryCacheStorage) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    type Store = MemoryCacheStore;

    async fn open(&self, name: &str) -> Result<MemoryCacheStore, StoreError> {
        if self.fail_open {
            return Err(StoreError::Unavailable("quota exceeded".to_string()));
        }
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_keys {
            return Err(StoreError::Unavailable("listing failed".to_string()));
        }
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        if self.fail_delete.contains(name) {
            return Err(StoreError::Unavailable(format!("{name} is locked")));
        }
        self.inner.delete(name).await
    }

    async fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, StoreError> {
        if self.fail_lookup {
            return Err(StoreError::Unavailable("read failed".to_string()));
        }
        self.inner.lookup(name, key).await
    }
}

/// Holds the fetch of `held` until the fetch of `release` has started.
///
/// Only completes when fetches run concurrently; a one-at-a-time caller
/// waits forever on `held`.
#[derive(Debug, Clone)]
pub struct GatedNetwork {
    pub inner: StaticNetwork,
    held: String,
    release: String,
    gate: Arc<Notify>,
    settled: Arc<AtomicUsize>,
}

impl GatedNetwork {
    pub fn new(inner: StaticNetwork, held: &str, release: &str) -> Self {
        Self {
            inner,
            held: url(held),
            release: url(release),
            gate: Arc::new(Notify::new()),
            settled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fetches that have finished.
    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, NetworkError> {
        if request.url() == self.release {
            self.gate.notify_one();
        }
        if request.url() == self.held {
            self.gate.notified().await;
            // Finish well after the other attempts.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let result = self.inner.fetch(request).await;
        self.settled.fetch_add(1, Ordering::SeqCst);
        result
    }
}
