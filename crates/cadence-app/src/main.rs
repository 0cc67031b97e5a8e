//! Cadence service entry point: config, logging, clients, background sweep,
//! and the HTTP server.

mod cli;

use std::sync::Arc;

use clap::Parser;

use cadence_api::{start_server, AppState};
use cadence_chat::{OpenAiChatModel, SpotifyCatalog, TurnOrchestrator};
use cadence_core::config::CadenceConfig;
use cadence_core::events::EventBus;

use crate::cli::CliArgs;

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Periodically drop sessions that have been idle past their timeout.
async fn session_sweep_loop(orchestrator: Arc<TurnOrchestrator>, interval_secs: u64) {
    tracing::info!(interval_secs, "Session sweep loop started");

    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let removed = orchestrator.expire_idle();
        if removed > 0 {
            tracing::info!(removed, "Expired idle sessions");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = CadenceConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    config.general.port = args.resolve_port(config.general.port);
    config.general.host = args.resolve_host(&config.general.host);
    let log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Upstream clients. Missing credentials are not fatal; those calls fall back.
    let events = EventBus::default();
    let model = OpenAiChatModel::new(&config.llm)?;
    if !model.has_api_key() {
        tracing::warn!("No language model API key configured; replies will use the fallback text");
    }
    let catalog = SpotifyCatalog::new(&config.catalog, events.clone())?;
    if !catalog.has_credentials() {
        tracing::warn!("Spotify credentials missing; song links will be empty");
    }
    tracing::info!(
        model = %config.llm.model,
        reuse_tokens = config.catalog.reuse_tokens,
        "Upstream clients ready"
    );

    let orchestrator = TurnOrchestrator::new(
        &config.session,
        Arc::new(model),
        Arc::new(catalog),
        events,
    );
    let state = AppState::new(orchestrator);

    // === Background tasks ===

    if config.session.session_timeout_minutes > 0 {
        let orchestrator = Arc::clone(&state.orchestrator);
        tokio::spawn(async move {
            session_sweep_loop(orchestrator, SESSION_SWEEP_INTERVAL_SECS).await;
        });
    }

    // === API server ===

    if let Err(e) = start_server(&config.general, state).await {
        tracing::error!(error = %e, "API server stopped");
        return Err(e.into());
    }

    Ok(())
}
