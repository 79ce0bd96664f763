use anyhow::Result;
use experiment_sampler::{config, metrics, registry, server, watcher};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "experiment_sampler=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Experiment Sampler");

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    metrics::init();

    // A bad definition at startup is fatal; a misconfigured ratio must not go live
    let registry = Arc::new(registry::ExperimentRegistry::new(config.experiments_dir.clone()));
    let count = registry.load_all()?;
    metrics::ACTIVE_EXPERIMENTS.set(count as i64);
    tracing::info!("Experiments loaded: {}", count);

    let watcher_handle = if config.hot_reload && config.experiments_dir.exists() {
        let watcher_registry = registry.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = watcher::watch_experiments(watcher_registry).await {
                tracing::error!("Watcher error: {}", e);
            }
        }))
    } else {
        tracing::info!("Hot reload disabled");
        None
    };

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(config, registry).await {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = server_handle => {
            tracing::warn!("Server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    if let Some(handle) = watcher_handle {
        handle.abort();
    }

    Ok(())
}
