pub mod rpc;
pub mod signer;
pub mod transformations;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::B256;
use alloy_transport::TransportError;
use futures::stream::{self, StreamExt};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetcher::rpc::NodeClient;
use crate::fetcher::signer::recover_sender;
use crate::fetcher::transformations::RecordTransformer;
use crate::metrics::Metrics;
use crate::models::common::FetchConfig;
use crate::models::errors::{FetchError, FetchFailures};
use crate::models::transactions::TransactionRecord;

/// Resolves transaction hashes against a node, one concurrent lookup per hash.
pub struct NodeFetcher<N> {
    client: N,
    max_concurrency: usize,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<N: NodeClient> NodeFetcher<N> {
    pub fn new(client: N, config: &FetchConfig) -> Self {
        Self {
            client,
            max_concurrency: config.max_concurrency.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn fetch(&self, hashes: &[String]) -> (Vec<TransactionRecord>, Option<FetchFailures>) {
        self.fetch_with_cancel(hashes, &CancellationToken::new()).await
    }

    /// Attempts every hash and returns the successes in completion order.
    ///
    /// Lookups share one deadline and one cancellation token; once either fires
    /// the outstanding lookups resolve as failures and are reported with the rest.
    pub async fn fetch_with_cancel(
        &self,
        hashes: &[String],
        cancel: &CancellationToken,
    ) -> (Vec<TransactionRecord>, Option<FetchFailures>) {
        let deadline = tokio::time::Instant::now() + self.timeout;

        let mut outcomes = stream::iter(hashes)
            .map(|hash| async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(FetchError::TimedOut),
                    outcome = self.fetch_one(hash) => outcome,
                };
                (hash, outcome)
            })
            .buffer_unordered(self.max_concurrency);

        let mut records = Vec::with_capacity(hashes.len());
        let mut failures = FetchFailures::default();

        while let Some((hash, outcome)) = outcomes.next().await {
            match outcome {
                Ok(record) => {
                    debug!("Fetched transaction {} from node", hash);
                    records.push(record);
                }
                Err(cause) => {
                    warn!("Failed to fetch transaction {}: {}", hash, cause);
                    failures.push(hash.clone(), cause);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_node_fetch(records.len() as u64, failures.len() as u64);
        }

        info!(
            "Transactions fetched from node: {} succeeded, {} failed",
            records.len(),
            failures.len()
        );

        (records, failures.into_option())
    }

    async fn fetch_one(&self, hash: &str) -> Result<TransactionRecord, FetchError> {
        let tx_hash: B256 = hash.parse().map_err(|_| FetchError::InvalidHash)?;

        let envelope = self
            .observe("eth_getTransactionByHash", self.client.transaction_by_hash(tx_hash))
            .await?
            .ok_or(FetchError::TransactionNotFound)?;

        let receipt = self
            .observe("eth_getTransactionReceipt", self.client.transaction_receipt(tx_hash))
            .await?
            .ok_or(FetchError::ReceiptNotFound)?;

        let chain_id = self.observe("eth_chainId", self.client.chain_id()).await?;

        let from = recover_sender(&envelope, chain_id)?;

        (&envelope).into_record(receipt, from)
    }

    async fn observe<T>(
        &self,
        method: &'static str,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, FetchError> {
        let started = Instant::now();
        let result = call.await;

        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(method, started, result.is_err());
        }

        result.map_err(|source| FetchError::Rpc { method, source })
    }
}
