pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::models::errors::StoreError;
use crate::models::transactions::TransactionRecord;
use crate::models::users::User;

/// Persistent cache of transaction records and per-user lookup history.
///
/// A miss is never an error: lookups return whatever subset exists.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Inserts records whose hash is not stored yet; existing hashes are left untouched.
    async fn insert_many(&self, records: &[TransactionRecord]) -> Result<(), StoreError>;

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn find_user_history(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    /// Appends `(user_id, hash)` pairs; a pair already on file is skipped.
    async fn append_user_history(&self, user_id: &str, hashes: &[String]) -> Result<(), StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Returns `false` without writing when the username is already taken.
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError>;
}

/// Sending half of the write-back channel. Enqueueing never waits on the store.
#[derive(Clone)]
pub struct WriteBack {
    tx: Sender<Vec<TransactionRecord>>,
    metrics: Option<Arc<Metrics>>,
}

/// The task draining the write-back channel into the store.
pub struct WriteBackWorker {
    handle: JoinHandle<()>,
}

impl WriteBack {
    /// Hands `records` to the worker. A full or closed channel drops the batch;
    /// those hashes simply miss the cache again next time.
    pub fn enqueue(&self, records: Vec<TransactionRecord>) {
        if records.is_empty() {
            return;
        }

        match self.tx.try_send(records) {
            Ok(()) => {}
            Err(TrySendError::Full(records)) => {
                warn!(
                    "Write-back channel full, dropping {} transactions",
                    records.len()
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_write_back(0, true);
                }
            }
            Err(TrySendError::Closed(records)) => {
                warn!(
                    "Write-back worker stopped, dropping {} transactions",
                    records.len()
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_write_back(0, true);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_channel_capacity(self.tx.capacity());
        }
    }
}

impl WriteBackWorker {
    /// Waits until every queued batch is persisted. Returns once all
    /// [`WriteBack`] handles have been dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Write-back worker panicked: {}", e);
        }
    }
}

pub fn setup_write_back(
    store: Arc<dyn CacheStore>,
    capacity: usize,
    metrics: Option<Arc<Metrics>>,
) -> (WriteBack, WriteBackWorker) {
    let (tx, mut rx) = mpsc::channel::<Vec<TransactionRecord>>(capacity.max(1));

    let worker_metrics = metrics.clone();
    let handle = tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            match store.insert_many(&batch).await {
                Ok(()) => {
                    debug!("Cached {} transactions from node", batch.len());
                    if let Some(metrics) = &worker_metrics {
                        metrics.record_write_back(batch.len() as u64, false);
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to save {} transactions to store: {}",
                        batch.len(),
                        e
                    );
                    if let Some(metrics) = &worker_metrics {
                        metrics.record_write_back(0, true);
                    }
                }
            }
        }
        info!("Write-back worker shut down");
    });

    (WriteBack { tx, metrics }, WriteBackWorker { handle })
}
