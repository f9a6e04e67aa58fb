//! Bootstrap and the change stream.
//!
//! On start the store is snapshotted and replayed as an ordered
//! sequence of creates, hosts before their locations. After that the
//! store's watch stream feeds a bounded queue drained by the reconciler
//! task; a full queue blocks the watcher, which is the backpressure.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::reconcile::{Action, Change, Reconciler};
use crate::store::{ConfigStore, StoreError};

/// Bound on in-flight changes between the watcher and the reconciler.
pub const CHANGE_QUEUE_CAPACITY: usize = 128;

/// Replays the store snapshot through the reconciler. Individual
/// changes that fail are logged and skipped; only a failed snapshot is
/// fatal.
pub async fn bootstrap(store: &dyn ConfigStore, reconciler: &mut Reconciler) -> Result<(), StoreError> {
    let hosts = store.snapshot().await?;
    tracing::info!(hosts = hosts.len(), "bootstrapping from store snapshot");

    for host in hosts {
        let locations = host.locations.clone();
        apply_logged(reconciler, Change::host(Action::Create, host.clone()));
        for location in locations {
            apply_logged(reconciler, Change::location(Action::Create, host.clone(), location));
        }
    }
    Ok(())
}

/// Streams store deltas into the reconciler until the stream dies.
/// Always returns an error: a finished stream means the store is gone
/// and the process should restart and resnapshot.
pub async fn stream_changes(
    store: Arc<dyn ConfigStore>,
    mut reconciler: Reconciler,
) -> Result<(), StoreError> {
    let (tx, mut rx) = mpsc::channel(CHANGE_QUEUE_CAPACITY);

    let watcher = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.watch(tx).await })
    };

    while let Some(change) = rx.recv().await {
        tracing::info!(%change, "applying change");
        apply_logged(&mut reconciler, change);
    }

    match watcher.await {
        Ok(Err(error)) => Err(error),
        Ok(Ok(())) => Err(StoreError::StreamClosed),
        Err(join_error) => {
            tracing::error!(error = %join_error, "store watcher task died");
            Err(StoreError::StreamClosed)
        }
    }
}

fn apply_logged(reconciler: &mut Reconciler, change: Change) {
    let description = change.to_string();
    if let Err(error) = reconciler.apply(change) {
        tracing::warn!(change = %description, %error, "dropped change");
    }
}
