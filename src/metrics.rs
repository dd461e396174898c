//! Prometheus counters for the agent lifecycle.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Counters owned by one agent, registered in a private registry.
#[derive(Clone)]
pub struct AgentMetrics {
    registry: Registry,
    pub assets_stored: IntCounter,
    pub assets_failed: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub network_failures: IntCounter,
    pub stores_deleted: IntCounter,
    pub store_delete_failures: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl AgentMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            assets_stored: counter(
                &registry,
                "asset_cache_assets_stored_total",
                "Manifest assets stored during install",
            )?,
            assets_failed: counter(
                &registry,
                "asset_cache_assets_failed_total",
                "Manifest assets that failed to cache during install",
            )?,
            cache_hits: counter(
                &registry,
                "asset_cache_hits_total",
                "Requests served from the current generation",
            )?,
            cache_misses: counter(
                &registry,
                "asset_cache_misses_total",
                "Requests forwarded to the network",
            )?,
            network_failures: counter(
                &registry,
                "asset_cache_network_failures_total",
                "Forwarded requests that failed at the network",
            )?,
            stores_deleted: counter(
                &registry,
                "asset_cache_stores_deleted_total",
                "Stale generations deleted during activation",
            )?,
            store_delete_failures: counter(
                &registry,
                "asset_cache_store_delete_failures_total",
                "Stale generations that could not be deleted",
            )?,
            registry,
        })
    }

    /// Render all counters in the prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
