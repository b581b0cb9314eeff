//! Session Harvester
//!
//! Single-run binary that:
//! 1. Reuses a cached session cookie, or logs in through the nonce handshake
//! 2. Fetches the users API with that session
//! 3. Scrapes the hidden tokens page and signs them with the shared secret
//! 4. Fetches the signed settings API
//! 5. Writes both responses to one JSON file

mod config;
mod error;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::orchestrator::SessionOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let run_id = format!("run_{}", uuid::Uuid::new_v4().as_simple());
    let result = run().instrument(info_span!("harvest", %run_id)).await;
    if let Err(e) = &result {
        error!(%run_id, error = %format!("{e:#}"), "run failed");
    }
    result
}

async fn run() -> Result<()> {
    info!("starting session-harvester");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let (config_path, explicit) = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), explicit, "loading configuration");

    let config = if explicit {
        Config::load(&config_path)
    } else {
        Config::load_or_default(&config_path)
    }
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.server.base_url,
        api_base_url = %config.server.api_base_url,
        username = %config.auth.username,
        credential_file = %config.storage.credential_file.display(),
        "configuration loaded"
    );

    let orchestrator =
        SessionOrchestrator::new(&config).context("failed to initialize HTTP client")?;
    let result = orchestrator.run().await.context("harvest failed")?;

    output::write_result(&config.storage.output_file, &result)
        .await
        .context("failed to write output")?;

    info!("done");
    Ok(())
}
