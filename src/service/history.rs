use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::fetcher::rpc::NodeClient;
use crate::models::errors::ServiceError;
use crate::models::transactions::TransactionRecord;
use crate::parsers::canonical_hash;
use crate::service::TransactionService;

impl<N: NodeClient> TransactionService<N> {
    /// Records `hashes` in the history of the token's subject.
    ///
    /// Returns how many new entries were written. An empty list returns
    /// before the token is even looked at.
    pub async fn record_history(&self, token: &str, hashes: &[String]) -> Result<usize, ServiceError> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let subject = self.tokens.validate(token)?;
        self.record_history_for(&subject, hashes).await
    }

    /// Appends the hashes not already on file for `subject`, in canonical form.
    /// Malformed hashes are skipped.
    ///
    /// De-duplication reads the history first, so two concurrent calls may
    /// both see a hash as new; the store's uniqueness constraint absorbs that.
    pub async fn record_history_for(
        &self,
        subject: &str,
        hashes: &[String],
    ) -> Result<usize, ServiceError> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let existing: HashSet<String> = self
            .store
            .find_user_history(subject)
            .await?
            .into_iter()
            .collect();

        let mut seen = HashSet::new();
        let mut new_hashes = Vec::new();
        for hash in hashes {
            let canonical = match canonical_hash(hash) {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!("Skipping history entry {:?} for {}: {}", hash, subject, e);
                    continue;
                }
            };
            if !existing.contains(&canonical) && seen.insert(canonical.clone()) {
                new_hashes.push(canonical);
            }
        }

        if new_hashes.is_empty() {
            debug!("No new history entries for user {}", subject);
            return Ok(0);
        }

        self.store.append_user_history(subject, &new_hashes).await?;
        info!(
            "User history saved for {}: {} new transactions",
            subject,
            new_hashes.len()
        );

        Ok(new_hashes.len())
    }

    /// Transactions in `subject`'s history, served from the store only.
    pub async fn history_for(&self, subject: &str) -> Result<Vec<TransactionRecord>, ServiceError> {
        let hashes = self.store.find_user_history(subject).await?;
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.store.find_by_hashes(&hashes).await?;
        info!(
            "User transactions history fetched from store for {}: {}",
            subject,
            records.len()
        );
        Ok(records)
    }

    pub async fn history_for_token(&self, token: &str) -> Result<Vec<TransactionRecord>, ServiceError> {
        let subject = self.tokens.validate(token)?;
        self.history_for(&subject).await
    }
}
