//! Config store contract.
//!
//! The store is authoritative: the core persists nothing and rebuilds
//! from a fresh snapshot on every boot. Within a logical transaction
//! the store guarantees parents precede children on create and children
//! precede parents on delete; the core does not reorder.

mod etcd;
#[cfg(test)]
mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::HostSpec;
use crate::reconcile::Change;

pub use etcd::EtcdStore;
#[cfg(test)]
pub use memory::MemoryStore;

/// Failures talking to the store. Connection and stream variants are
/// fatal: the process restarts and resnapshots rather than resuming
/// from an offset.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed")]
    Etcd(#[from] etcd_client::Error),

    #[error("change stream closed")]
    StreamClosed,

    #[error("malformed store entry at {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Source of the declared configuration and its deltas.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Full declared config: hosts with nested locations, upstream
    /// bindings and endpoints.
    async fn snapshot(&self) -> Result<Vec<HostSpec>, StoreError>;

    /// Streams every subsequent delta into `tx`, blocking on a full
    /// queue for backpressure. Returning, with or without an error,
    /// means the stream is gone and the process should restart.
    async fn watch(&self, tx: mpsc::Sender<Change>) -> Result<(), StoreError>;
}
