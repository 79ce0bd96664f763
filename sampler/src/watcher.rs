use crate::catalog::is_config_file;
use crate::metrics;
use crate::registry::ExperimentRegistry;
use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Watch the experiments directory and hot reload changed definitions
pub async fn watch_experiments(registry: Arc<ExperimentRegistry>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(100);

    let experiments_dir = registry.experiments_dir().to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        Config::default(),
    )?;

    watcher.watch(&experiments_dir, RecursiveMode::NonRecursive)?;

    tracing::info!("Watching experiments directory: {:?}", experiments_dir);

    while let Some(event) = rx.recv().await {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    handle_file_change(&registry, &path).await;
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    handle_file_remove(&registry, &path);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

async fn handle_file_change(registry: &ExperimentRegistry, path: &Path) {
    if !path.is_file() || !is_config_file(path) {
        return;
    }

    tracing::info!("Detected change in experiment file: {:?}", path);

    // Let the writer finish
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    // Keyed by the name inside the file, same as the initial load
    match registry.load_file(path) {
        Ok(name) => {
            tracing::info!("Hot reloaded experiment: {}", name);
            metrics::RELOAD_TOTAL.inc();
            metrics::ACTIVE_EXPERIMENTS.set(registry.len() as i64);
        }
        Err(e) => {
            tracing::error!("Failed to reload {:?}: {}", path, e);
            metrics::RELOAD_ERRORS.inc();
        }
    }
}

fn handle_file_remove(registry: &ExperimentRegistry, path: &Path) {
    if !is_config_file(path) {
        return;
    }

    tracing::info!("Detected removal of experiment file: {:?}", path);

    match registry.remove_file(path) {
        Ok(_) => metrics::ACTIVE_EXPERIMENTS.set(registry.len() as i64),
        Err(e) => tracing::warn!("{}", e),
    }
}
