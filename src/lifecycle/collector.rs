//! Activate-phase removal of superseded generations.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::generation::{CacheKey, Generation};
use crate::cache::store::{CacheStorage, StoreError};

/// What one collection run removed and what it could not.
#[derive(Debug)]
pub struct CollectionReport {
    pub current: CacheKey,
    pub deleted: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

impl CollectionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes every store that does not belong to the current generation.
pub struct GenerationCollector<'a, S> {
    storage: &'a S,
}

impl<'a, S: CacheStorage> GenerationCollector<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Delete all stores not owned by the `current` generation.
    ///
    /// Deletions run concurrently and fail independently; only failing to list
    /// the stores is returned as an error.
    pub async fn collect_garbage(
        &self,
        current: &Generation,
    ) -> Result<CollectionReport, StoreError> {
        let names = self.storage.keys().await?;
        let stale: Vec<String> = names
            .into_iter()
            .filter(|n| !current.owns(n))
            .collect();

        if stale.is_empty() {
            debug!(current = %current.key(), "No stale generations");
        }

        let deletions = stale.into_iter().map(|name| async move {
            let result = self.storage.delete(&name).await;
            (name, result)
        });

        let mut report = CollectionReport {
            current: current.key().clone(),
            deleted: Vec::new(),
            failed: Vec::new(),
        };
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => {
                    info!(store = %name, "Deleted stale generation");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(store = %name, error = %e, "Failed to delete stale generation");
                    report.failed.push((name, e));
                }
            }
        }

        Ok(report)
    }
}
