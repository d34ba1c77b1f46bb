//! `solarweb run`: the long-running mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use solarweb_core::{Scheduler, SweepReport, TreeStore};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = super::resolve(global)?;
    let snapshot = args
        .snapshot_file
        .or_else(|| resolved.profile.snapshot_file.clone());

    let mirror = resolved.mirror_config()?;
    let url = mirror.base_url.to_string();
    let store = Arc::new(TreeStore::new());
    let scheduler = Scheduler::new(mirror, store.clone())
        .map_err(|e| CliError::from_core(e, &resolved.name, &url))?;

    let writer = snapshot.clone().map(|path| {
        tokio::spawn(persist_after_sweeps(
            store.clone(),
            scheduler.last_sweep(),
            path,
        ))
    });

    let started = scheduler.start(Some(store.subscribe_commands())).await;
    if let Err(ref e) = started {
        // A failed first login is terminal; idle until signalled.
        warn!(error = %e, "login failed, waiting for shutdown signal");
    } else {
        info!(profile = %resolved.name, "mirror running");
    }

    shutdown_signal().await;
    scheduler.shutdown().await;

    if let Some(task) = writer {
        task.abort();
    }
    if let Some(path) = snapshot {
        persist(&store, &path).await;
    }

    started.map_err(|e| CliError::from_core(e, &resolved.name, &url))
}

/// Write the tree to `path` after every completed sweep.
async fn persist_after_sweeps(
    store: Arc<TreeStore>,
    mut sweeps: watch::Receiver<Arc<SweepReport>>,
    path: PathBuf,
) {
    while sweeps.changed().await.is_ok() {
        persist(&store, &path).await;
    }
}

async fn persist(store: &Arc<TreeStore>, path: &Path) {
    let store = Arc::clone(store);
    let target = path.to_path_buf();
    match tokio::task::spawn_blocking(move || store.persist(&target)).await {
        Ok(Ok(())) => debug!(path = %path.display(), "snapshot written"),
        Ok(Err(e)) => warn!(path = %path.display(), error = %e, "snapshot write failed"),
        Err(e) => error!(error = %e, "snapshot task failed"),
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
