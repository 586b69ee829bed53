use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::errors::StoreError;
use crate::models::transactions::TransactionRecord;
use crate::models::users::User;
use crate::storage::CacheStore;

/// In-process [`CacheStore`], used for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    transactions: RwLock<Vec<TransactionRecord>>,
    history: RwLock<HashMap<String, Vec<String>>>,
    users: RwLock<HashMap<String, User>>,
    transaction_writes: AtomicUsize,
    history_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(records: impl IntoIterator<Item = TransactionRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| seen.insert(record.hash.clone()))
            .collect();

        Self {
            transactions: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Number of `insert_many` calls completed so far.
    pub fn transaction_writes(&self) -> usize {
        self.transaction_writes.load(Ordering::SeqCst)
    }

    /// Number of `append_user_history` calls served so far.
    pub fn history_writes(&self) -> usize {
        self.history_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<TransactionRecord>, StoreError> {
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let transactions = self.transactions.read().await;

        Ok(transactions
            .iter()
            .filter(|record| wanted.contains(record.hash.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, records: &[TransactionRecord]) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write().await;

        for record in records {
            if !transactions.iter().any(|existing| existing.hash == record.hash) {
                transactions.push(record.clone());
            }
        }
        // Counted once the records are visible to readers
        self.transaction_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self.transactions.read().await.clone())
    }

    async fn find_user_history(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .history
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_user_history(&self, user_id: &str, hashes: &[String]) -> Result<(), StoreError> {
        self.history_writes.fetch_add(1, Ordering::SeqCst);
        let mut history = self.history.write().await;
        let entries = history.entry(user_id.to_string()).or_default();

        for hash in hashes {
            if !entries.contains(hash) {
                entries.push(hash.clone());
            }
        }
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Ok(false);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(true)
    }
}
