mod history;
mod users;

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::TokenAuthority;
use crate::fetcher::NodeFetcher;
use crate::fetcher::rpc::NodeClient;
use crate::metrics::Metrics;
use crate::models::errors::{FetchFailures, ServiceError};
use crate::models::transactions::TransactionRecord;
use crate::parsers::{canonical_hash, decode_hash_batch};
use crate::storage::{CacheStore, WriteBack};

const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Outcome of a retrieval: everything that could be resolved, plus the
/// hashes the node failed on. A partial node failure is not an error.
#[derive(Debug)]
pub struct Retrieved {
    pub records: Vec<TransactionRecord>,
    pub failures: Option<FetchFailures>,
}

impl Retrieved {
    pub fn hashes(&self) -> Vec<String> {
        self.records.iter().map(|record| record.hash.clone()).collect()
    }
}

/// Read-through cache over the store, falling back to the node for misses.
pub struct TransactionService<N> {
    store: Arc<dyn CacheStore>,
    fetcher: NodeFetcher<N>,
    tokens: Arc<dyn TokenAuthority>,
    write_back: WriteBack,
    metrics: Option<Arc<Metrics>>,
    token_ttl_hours: i64,
}

impl<N: NodeClient> TransactionService<N> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: NodeFetcher<N>,
        tokens: Arc<dyn TokenAuthority>,
        write_back: WriteBack,
    ) -> Self {
        Self {
            store,
            fetcher,
            tokens,
            write_back,
            metrics: None,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }

    /// Lifetime of the tokens issued by [`authenticate`](Self::authenticate).
    pub fn with_token_ttl(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn retrieve(&self, hashes: &[String]) -> Result<Retrieved, ServiceError> {
        self.retrieve_with_cancel(hashes, &CancellationToken::new())
            .await
    }

    /// Serves `hashes` from the store and asks the node only for the rest.
    ///
    /// Hashes are folded to their canonical form first, so every spelling of
    /// one transaction shares a cache entry and is returned once. Malformed
    /// hashes are reported as failures without touching the store or the node.
    ///
    /// Node-origin records are queued for write-back and returned without
    /// waiting for them to be persisted. Only a failing store read fails the call.
    pub async fn retrieve_with_cancel(
        &self,
        hashes: &[String],
        cancel: &CancellationToken,
    ) -> Result<Retrieved, ServiceError> {
        let mut failures = FetchFailures::default();
        let mut requested = Vec::with_capacity(hashes.len());
        let mut seen = HashSet::new();
        for hash in hashes {
            match canonical_hash(hash) {
                Ok(canonical) => {
                    if seen.insert(canonical.clone()) {
                        requested.push(canonical);
                    }
                }
                Err(cause) => {
                    warn!("Rejected transaction hash {:?}: {}", hash, cause);
                    failures.push(hash.clone(), cause);
                }
            }
        }

        if requested.is_empty() {
            return Ok(Retrieved {
                records: Vec::new(),
                failures: failures.into_option(),
            });
        }

        let cached = self.store.find_by_hashes(&requested).await?;
        info!("Transactions fetched from store: {}", cached.len());

        let found: HashSet<&str> = cached.iter().map(|record| record.hash.as_str()).collect();
        let missing: Vec<String> = requested
            .iter()
            .filter(|hash| !found.contains(hash.as_str()))
            .cloned()
            .collect();

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(cached.len() as u64, missing.len() as u64);
        }

        if missing.is_empty() {
            info!("All {} transactions found in store", cached.len());
            return Ok(Retrieved {
                records: cached,
                failures: failures.into_option(),
            });
        }

        let (fetched, fetch_failures) = self.fetcher.fetch_with_cancel(&missing, cancel).await;
        if let Some(fetch_failures) = fetch_failures {
            error!(
                "Failed to fetch {} of {} transactions from node:\n{}",
                fetch_failures.len(),
                missing.len(),
                fetch_failures
            );
            failures.append(fetch_failures);
        }

        info!("Caching {} transactions from node", fetched.len());
        self.write_back.enqueue(fetched.clone());

        let mut records = cached;
        records.extend(fetched);

        Ok(Retrieved {
            records,
            failures: failures.into_option(),
        })
    }

    /// Decodes a hash batch token and retrieves the hashes it carries.
    /// A malformed token fails the call before the store is touched.
    pub async fn retrieve_encoded(
        &self,
        auth_token: Option<&str>,
        batch: &str,
    ) -> Result<Retrieved, ServiceError> {
        let hashes = decode_hash_batch(batch)?;
        info!("Decoded {} hashes from batch token", hashes.len());
        self.retrieve_for(auth_token, &hashes).await
    }

    /// Retrieves `hashes` and, for an authenticated caller, records the
    /// returned hashes in their history. History failures are only logged.
    pub async fn retrieve_for(
        &self,
        auth_token: Option<&str>,
        hashes: &[String],
    ) -> Result<Retrieved, ServiceError> {
        let retrieved = self.retrieve(hashes).await?;

        if let Some(token) = auth_token {
            if let Err(e) = self.record_history(token, &retrieved.hashes()).await {
                error!("Failed to save user history: {}", e);
            }
        }

        Ok(retrieved)
    }

    pub async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, ServiceError> {
        Ok(self.store.all_transactions().await?)
    }
}
