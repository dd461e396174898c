//! Install-phase population of the current generation.
//!
//! Every manifest entry is fetched and stored independently and concurrently.
//! A failing entry is reported and skipped; only failing to open the store
//! itself aborts the install.

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::entry::{AssetRequest, RequestKey};
use crate::cache::generation::CacheKey;
use crate::cache::store::{CacheStorage, CacheStore, StoreError};
use crate::lifecycle::manifest::AssetManifest;
use crate::network::{Network, NetworkError};

/// Why a single manifest entry could not be cached.
#[derive(Error, Debug)]
pub enum AssetFetchFailure {
    #[error("Invalid asset URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Unexpected status {0}")]
    BadStatus(u16),

    #[error("Store write failed: {0}")]
    StoreWrite(#[from] StoreError),
}

/// Fatal install failure.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to open cache store {key}: {source}")]
    StoreOpen {
        key: CacheKey,
        #[source]
        source: StoreError,
    },
}

/// Result of caching one manifest entry.
#[derive(Debug)]
pub enum CacheEntryOutcome {
    Stored,
    Failed(AssetFetchFailure),
}

impl CacheEntryOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Outcome of one manifest entry, by manifest position.
#[derive(Debug)]
pub struct EntryReport {
    pub index: usize,
    pub url: String,
    pub outcome: CacheEntryOutcome,
}

/// Per-entry outcomes of a completed population run.
#[derive(Debug)]
pub struct InstallReport {
    pub key: CacheKey,
    pub entries: Vec<EntryReport>,
}

impl InstallReport {
    pub fn stored(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_stored()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.stored()
    }

    /// Whether every manifest entry made it into the store.
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntryReport, &AssetFetchFailure)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            CacheEntryOutcome::Failed(reason) => Some((e, reason)),
            CacheEntryOutcome::Stored => None,
        })
    }
}

/// Fills a generation's store from the asset manifest.
pub struct Prepopulator<'a, S, N> {
    storage: &'a S,
    network: &'a N,
    scope: &'a Url,
}

impl<'a, S, N> Prepopulator<'a, S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(storage: &'a S, network: &'a N, scope: &'a Url) -> Self {
        Self {
            storage,
            network,
            scope,
        }
    }

    /// Open (or create) the store `key` and try to cache every manifest entry.
    ///
    /// Resolves only once every attempt has settled.
    pub async fn populate(
        &self,
        key: &CacheKey,
        manifest: &AssetManifest,
    ) -> Result<InstallReport, InstallError> {
        let store = self
            .storage
            .open(key.as_str())
            .await
            .map_err(|source| InstallError::StoreOpen {
                key: key.clone(),
                source,
            })?;

        let resolved = manifest.resolve(self.scope);
        let attempts = manifest.iter().zip(resolved).enumerate().map(|(index, (url, request))| {
            let store = &store;
            async move {
                let outcome = match self.cache_one(store, request).await {
                    Ok(()) => CacheEntryOutcome::Stored,
                    Err(reason) => CacheEntryOutcome::Failed(reason),
                };
                EntryReport {
                    index,
                    url: url.to_string(),
                    outcome,
                }
            }
        });
        let entries = join_all(attempts).await;

        let report = InstallReport {
            key: key.clone(),
            entries,
        };

        for (entry, reason) in report.failures() {
            warn!(
                index = entry.index,
                url = %entry.url,
                error = %reason,
                "Failed to cache asset"
            );
        }

        info!(
            key = %key,
            stored = report.stored(),
            failed = report.failed(),
            "Population complete"
        );

        Ok(report)
    }

    async fn cache_one(
        &self,
        store: &S::Store,
        key: Result<RequestKey, url::ParseError>,
    ) -> Result<(), AssetFetchFailure> {
        let key = key?;
        let response = self.network.fetch(&AssetRequest::with_key(key.clone())).await?;
        if !response.is_ok() {
            return Err(AssetFetchFailure::BadStatus(response.status));
        }
        store.put(&key, &response).await?;

        debug!(store = store.name(), key = %key, size = response.body.len(), "Cached asset");
        Ok(())
    }
}
