use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use asset_cache_agent::cache::disk::DiskCacheStorage;
use asset_cache_agent::config::{Cli, Config};
use asset_cache_agent::lifecycle::agent::Agent;
use asset_cache_agent::lifecycle::host::run_startup;
use asset_cache_agent::network::http::HttpNetwork;
use asset_cache_agent::server::proxy::{build_router, AppState};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "asset_cache_agent=debug,tower_http=debug"
    } else {
        "asset_cache_agent=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("asset-cache-agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    config.validate()?;
    let config = Arc::new(config);

    let generation = config.generation()?;
    let scope = config.scope()?;

    info!(
        version = %generation.tag(),
        key = %generation.key(),
        origin = %scope,
        cache_dir = %config.storage.cache_dir.display(),
        assets = config.manifest.len(),
        "Configuration loaded"
    );

    let storage = DiskCacheStorage::new(&config.storage.cache_dir).await?;
    let network = HttpNetwork::new(&config.upstream)?;
    let agent = Agent::new(
        generation,
        scope,
        config.manifest.clone(),
        storage,
        network,
    )?;

    // Install must settle before activation; a failed install leaves the
    // previous generation in place and is retried on the next start.
    if let Err(e) = run_startup(&agent).await {
        error!(error = %e, "Startup failed");
        return Err(e.into());
    }

    let state = Arc::new(AppState {
        agent,
        max_body_bytes: config.server.max_body_bytes,
        start_time: Instant::now(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = &config.server.listen;
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
