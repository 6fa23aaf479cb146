//! HTLC Swap Agent - storeman transaction agent for a two-chain token bridge
//!
//! Serves the swap action API and keeps one nonce sequence per chain for
//! every action submitted through it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use htlc_swap_agent::api::{self, AppState};
use htlc_swap_agent::chain::ChainManager;
use htlc_swap_agent::config::Settings;
use htlc_swap_agent::metrics::MetricsServer;
use htlc_swap_agent::registry::Registry;
use htlc_swap_agent::state::{StateManager, SwapStore};
use htlc_swap_agent::tx::{Credential, NonceSequencer, TransactionSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting HTLC Swap Agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for instance {} ({} tokens)",
        settings.agent.instance_id,
        settings.tokens.len()
    );

    // Token and family registry; any ABI problem stops startup here
    let registry = Arc::new(Registry::from_settings(&settings)?);

    // Initialize database connection
    let state_manager = Arc::new(StateManager::new(&settings.database).await?);
    info!("Database connection established");
    state_manager.run_migrations().await?;

    let password = std::env::var(&settings.wallet.password_env).with_context(|| {
        format!(
            "Keystore password variable {} is not set",
            settings.wallet.password_env
        )
    })?;

    // Chain connections and signers; keystores are decrypted here, once
    let chain_manager = Arc::new(ChainManager::connect(&settings, &Credential::new(password)).await?);
    info!("Chain connections initialized");

    let sender = Arc::new(TransactionSender::new(
        chain_manager.clone(),
        Arc::new(NonceSequencer::new()),
        Duration::from_secs(settings.agent.submit_timeout_secs),
    ));

    let store: Arc<dyn SwapStore> = state_manager.clone();
    let app_state = AppState::new(registry, store, sender);

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, app_state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let chain_manager = chain_manager.clone();
        let state_manager = state_manager.clone();
        let interval = settings.agent.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;

                for (chain, healthy) in chain_manager.health_check().await {
                    if !healthy {
                        warn!("{} chain health check failed", chain);
                    }
                }

                if let Err(e) = state_manager.health_check().await {
                    warn!("Database health check failed: {}", e);
                }
            }
        }
    });

    info!("HTLC Swap Agent is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("HTLC Swap Agent stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,htlc_swap_agent=debug,sqlx=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
