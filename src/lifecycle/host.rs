//! Startup sequencing: install, wait, activate, wait.

use tracing::info;

use crate::cache::store::CacheStorage;
use crate::lifecycle::agent::{Agent, AgentError};
use crate::lifecycle::collector::CollectionReport;
use crate::lifecycle::prepopulator::InstallReport;
use crate::network::Network;

/// Reports of both startup phases.
#[derive(Debug)]
pub struct StartupReport {
    pub install: InstallReport,
    pub collection: Option<CollectionReport>,
}

/// Run install to completion, then activation.
///
/// A fatal install error is returned without activating, so the previous
/// generation's store is left untouched for the next attempt.
pub async fn run_startup<S, N>(agent: &Agent<S, N>) -> Result<StartupReport, AgentError>
where
    S: CacheStorage,
    N: Network,
{
    let install = agent.on_install().await?;
    let collection = agent.on_activate().await?;

    info!(
        key = %agent.generation().key(),
        stored = install.stored(),
        failed = install.failed(),
        deleted = collection.as_ref().map(|c| c.deleted.len()).unwrap_or(0),
        "Generation active"
    );

    Ok(StartupReport {
        install,
        collection,
    })
}
