//! In-memory config store test double.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::HostSpec;
use crate::reconcile::Change;

use super::{ConfigStore, StoreError};

/// Serves a fixed snapshot and relays changes pushed through the feed
/// sender returned by [`MemoryStore::new`]. Dropping the feed ends the
/// watch, the same way a lost store connection would.
pub struct MemoryStore {
    hosts: Vec<HostSpec>,
    feed_rx: Mutex<Option<mpsc::Receiver<Change>>>,
}

impl MemoryStore {
    pub fn new(hosts: Vec<HostSpec>) -> (Self, mpsc::Sender<Change>) {
        let (feed_tx, feed_rx) = mpsc::channel(64);
        let store = Self {
            hosts,
            feed_rx: Mutex::new(Some(feed_rx)),
        };
        (store, feed_tx)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn snapshot(&self) -> Result<Vec<HostSpec>, StoreError> {
        Ok(self.hosts.clone())
    }

    async fn watch(&self, tx: mpsc::Sender<Change>) -> Result<(), StoreError> {
        let mut rx = self
            .feed_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(StoreError::StreamClosed)?;

        while let Some(change) = rx.recv().await {
            if tx.send(change).await.is_err() {
                // Receiver gone: the reconciler side shut down.
                return Err(StoreError::StreamClosed);
            }
        }
        Err(StoreError::StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationSpec, UpstreamSpec};
    use crate::reconcile::Action;

    #[tokio::test]
    async fn test_snapshot_returns_configured_hosts() {
        let (store, _feed) = MemoryStore::new(vec![HostSpec::named("h1"), HostSpec::named("h2")]);
        let hosts = store.snapshot().await.unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].name, "h1");
    }

    #[tokio::test]
    async fn test_watch_relays_fed_changes_in_order() {
        let (store, feed) = MemoryStore::new(vec![]);
        let (tx, mut rx) = mpsc::channel(8);

        let watcher = tokio::spawn(async move { store.watch(tx).await });

        feed.send(Change::host(Action::Create, HostSpec::named("h1")))
            .await
            .unwrap();
        feed.send(Change::location(
            Action::Create,
            HostSpec::named("h1"),
            LocationSpec {
                name: "api".into(),
                path: "/api".into(),
                upstream: UpstreamSpec::named("u1"),
            },
        ))
        .await
        .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Change::host(Action::Create, HostSpec::named("h1"))
        );
        assert!(matches!(rx.recv().await.unwrap(), Change::Location { .. }));

        // Dropping the feed ends the stream, which is fatal.
        drop(feed);
        let result = watcher.await.unwrap();
        assert!(matches!(result, Err(StoreError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_second_watch_fails() {
        let (store, feed) = MemoryStore::new(vec![]);

        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        drop(feed);
        assert!(store.watch(tx1).await.is_err());
        assert!(matches!(store.watch(tx2).await, Err(StoreError::StreamClosed)));
    }
}
