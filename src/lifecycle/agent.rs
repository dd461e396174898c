//! The agent: lifecycle handler table for one generation.
//!
//! The host calls [`Agent::on_install`], then [`Agent::on_activate`], then
//! [`Agent::on_fetch`] once per request. Each handler is an async function;
//! awaiting it is the completion signal the host must wait for before moving
//! to the next phase.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::entry::AssetRequest;
use crate::cache::generation::Generation;
use crate::cache::store::{CacheStorage, CacheStore, StoreError};
use crate::lifecycle::collector::{CollectionReport, GenerationCollector};
use crate::lifecycle::interceptor::{FetchInterceptor, FetchOutcome, ResponseSource};
use crate::lifecycle::manifest::AssetManifest;
use crate::lifecycle::prepopulator::{InstallError, InstallReport, Prepopulator};
use crate::metrics::AgentMetrics;
use crate::network::{Network, NetworkError};

/// Lifecycle phase of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Constructed, nothing run yet.
    Parsed,
    Installing,
    /// Install settled; waiting for activation.
    Installed,
    Activating,
    /// Owns request interception.
    Activated,
    /// Install failed fatally; this generation will not activate.
    Redundant,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Activated => "activated",
            Phase::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Cannot {action} while agent is {phase}")]
    PhaseOrder { action: &'static str, phase: Phase },

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Snapshot of the agent for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub version: String,
    pub cache_key: String,
    pub phase: Phase,
    pub stores: Vec<String>,
    pub current_entries: usize,
}

/// Handler table for one generation.
pub struct Agent<S, N> {
    generation: Generation,
    scope: Url,
    manifest: AssetManifest,
    storage: S,
    network: N,
    metrics: AgentMetrics,
    phase: watch::Sender<Phase>,
}

impl<S, N> Agent<S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(
        generation: Generation,
        scope: Url,
        manifest: AssetManifest,
        storage: S,
        network: N,
    ) -> Result<Self, AgentError> {
        let (phase, _) = watch::channel(Phase::Parsed);
        Ok(Self {
            generation,
            scope,
            manifest,
            storage,
            network,
            metrics: AgentMetrics::new()?,
            phase,
        })
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Move from one of `from` to `to`, or report the phase that blocked it.
    fn transition(
        &self,
        action: &'static str,
        from: &[Phase],
        to: Phase,
    ) -> Result<(), AgentError> {
        let mut blocked = None;
        self.phase.send_if_modified(|current| {
            if from.contains(current) {
                *current = to;
                true
            } else {
                blocked = Some(*current);
                false
            }
        });
        match blocked {
            Some(phase) => Err(AgentError::PhaseOrder { action, phase }),
            None => Ok(()),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    /// Install: populate the current generation from the manifest.
    ///
    /// Resolves once every manifest entry settled. Individual asset failures
    /// are part of the report; only a store-open failure is an error, after
    /// which the agent is redundant until a later install succeeds.
    pub async fn on_install(&self) -> Result<InstallReport, AgentError> {
        self.transition(
            "install",
            &[Phase::Parsed, Phase::Installed, Phase::Redundant],
            Phase::Installing,
        )?;
        info!(
            version = %self.generation.tag(),
            key = %self.generation.key(),
            assets = self.manifest.len(),
            "Installing"
        );

        let prepopulator = Prepopulator::new(&self.storage, &self.network, &self.scope);
        match prepopulator
            .populate(self.generation.key(), &self.manifest)
            .await
        {
            Ok(report) => {
                self.metrics.assets_stored.inc_by(report.stored() as u64);
                self.metrics.assets_failed.inc_by(report.failed() as u64);
                self.set_phase(Phase::Installed);
                Ok(report)
            }
            Err(e) => {
                error!(key = %self.generation.key(), error = %e, "Install failed");
                self.set_phase(Phase::Redundant);
                Err(e.into())
            }
        }
    }

    /// Activate: delete every generation other than the current one.
    ///
    /// Returns `None` if the stores could not be listed; the agent still
    /// activates and stale generations are retried on a later activation.
    pub async fn on_activate(&self) -> Result<Option<CollectionReport>, AgentError> {
        self.transition("activate", &[Phase::Installed], Phase::Activating)?;
        info!(version = %self.generation.tag(), "Activating");

        let collector = GenerationCollector::new(&self.storage);
        let report = match collector.collect_garbage(&self.generation).await {
            Ok(report) => {
                self.metrics
                    .stores_deleted
                    .inc_by(report.deleted.len() as u64);
                self.metrics
                    .store_delete_failures
                    .inc_by(report.failed.len() as u64);
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Could not list cache stores, skipping cleanup");
                None
            }
        };

        self.set_phase(Phase::Activated);
        Ok(report)
    }

    /// Fetch: serve one request cache-first.
    pub async fn on_fetch(&self, request: &AssetRequest) -> Result<FetchOutcome, NetworkError> {
        let interceptor = FetchInterceptor::new(&self.generation, &self.storage, &self.network);
        match interceptor.handle(request).await {
            Ok(outcome) => {
                match outcome.source {
                    ResponseSource::Cache => self.metrics.cache_hits.inc(),
                    ResponseSource::Network => self.metrics.cache_misses.inc(),
                }
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.cache_misses.inc();
                self.metrics.network_failures.inc();
                Err(e)
            }
        }
    }

    /// Current phase, store names and size of the current store.
    pub async fn status(&self) -> Result<AgentStatus, StoreError> {
        let key = self.generation.key();
        let stores = self.storage.keys().await?;
        let current_entries = if stores.iter().any(|s| s == key.as_str()) {
            self.storage.open(key.as_str()).await?.len().await?
        } else {
            0
        };

        Ok(AgentStatus {
            version: self.generation.tag().to_string(),
            cache_key: key.to_string(),
            phase: self.phase(),
            stores,
            current_entries,
        })
    }
}
