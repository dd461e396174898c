//! Per-request cache-first serving.
//!
//! The current generation's store is consulted first; on a miss the request
//! goes to the network and the result is returned as-is. Nothing is ever
//! written back: the install phase alone decides what a generation contains.

use std::fmt;

use tracing::{debug, warn};

use crate::cache::entry::{AssetRequest, AssetResponse};
use crate::cache::generation::Generation;
use crate::cache::store::CacheStorage;
use crate::network::{Network, NetworkError};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::Network => write!(f, "network"),
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub response: AssetResponse,
    pub source: ResponseSource,
}

/// Read-only request handler for one generation.
pub struct FetchInterceptor<'a, S, N> {
    generation: &'a Generation,
    storage: &'a S,
    network: &'a N,
}

impl<'a, S, N> FetchInterceptor<'a, S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(generation: &'a Generation, storage: &'a S, network: &'a N) -> Self {
        Self {
            generation,
            storage,
            network,
        }
    }

    /// Serve `request` from the current store, or from the network on a miss.
    ///
    /// Network failures are returned unchanged.
    pub async fn handle(&self, request: &AssetRequest) -> Result<FetchOutcome, NetworkError> {
        if request.key.is_get() {
            let key = self.generation.key();
            match self.storage.lookup(key.as_str(), &request.key).await {
                Ok(Some(response)) => {
                    debug!(store = %key, request = %request.key, "Cache hit");
                    return Ok(FetchOutcome {
                        response,
                        source: ResponseSource::Cache,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        store = %key,
                        request = %request.key,
                        error = %e,
                        "Cache read failed, using network"
                    );
                }
            }
        }

        debug!(request = %request.key, "Cache miss, fetching from network");
        let response = self.network.fetch(request).await?;
        Ok(FetchOutcome {
            response,
            source: ResponseSource::Network,
        })
    }
}
