#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_primitives::{Address, B256, Bytes, TxKind, U256, hex};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::{TransportError, TransportErrorKind};
use async_trait::async_trait;

use tx_cache::auth::HmacTokenAuthority;
use tx_cache::fetcher::NodeFetcher;
use tx_cache::fetcher::rpc::{NodeClient, NodeReceipt};
use tx_cache::models::common::FetchConfig;
use tx_cache::models::errors::StoreError;
use tx_cache::models::transactions::TransactionRecord;
use tx_cache::models::users::User;
use tx_cache::service::TransactionService;
use tx_cache::storage::memory::MemoryStore;
use tx_cache::storage::{CacheStore, WriteBackWorker, setup_write_back};

pub const CHAIN_ID: u64 = 1;
pub const BLOCK_NUMBER: u64 = 19_000_000;
pub const SECRET: &str = "test-secret";

pub fn hash_of(envelope: &TxEnvelope) -> String {
    hex::encode_prefixed(envelope.tx_hash())
}

/// An EIP-1559 transfer signed by `signer`; the nonce keeps hashes distinct.
pub fn signed_transfer(signer: &PrivateKeySigner, chain_id: u64, nonce: u64) -> TxEnvelope {
    let tx = TxEip1559 {
        chain_id,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: 30_000_000_000,
        max_priority_fee_per_gas: 1_000_000_000,
        to: TxKind::Call(Address::repeat_byte(0x22)),
        value: U256::from(1_000 + nonce),
        access_list: Default::default(),
        input: Bytes::new(),
    };
    let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
    TxEnvelope::Eip1559(tx.into_signed(signature))
}

pub fn mined_receipt() -> NodeReceipt {
    NodeReceipt {
        status: true,
        block_hash: Some(B256::repeat_byte(0xbb)),
        block_number: Some(BLOCK_NUMBER),
        contract_address: None,
        logs_count: 2,
    }
}

/// A record as it would already sit in the cache.
pub fn cached_record(hash: &str) -> TransactionRecord {
    TransactionRecord {
        hash: hash.to_string(),
        status: 1,
        block_hash: format!("0x{}", "cc".repeat(32)),
        block_number: 42,
        from: Address::repeat_byte(0x01).to_checksum(None),
        to: Some(Address::repeat_byte(0x02).to_checksum(None)),
        contract_address: None,
        logs_count: 0,
        input: "0x".to_string(),
        value: "0".to_string(),
    }
}

/// A node that answers from a fixed set of transactions.
#[derive(Default)]
pub struct NodeScript {
    transactions: HashMap<B256, TxEnvelope>,
    receipts: HashMap<B256, NodeReceipt>,
    failing: HashSet<B256>,
    chain_id: u64,
    delay: Duration,
    lookups: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl NodeScript {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Self::default()
        }
    }

    pub fn with_transaction(self, envelope: TxEnvelope) -> Self {
        self.with_receipt(envelope, mined_receipt())
    }

    pub fn with_receipt(mut self, envelope: TxEnvelope, receipt: NodeReceipt) -> Self {
        let hash = *envelope.tx_hash();
        self.transactions.insert(hash, envelope);
        self.receipts.insert(hash, receipt);
        self
    }

    pub fn with_failure(mut self, hash: &str) -> Self {
        self.failing.insert(hash.parse().unwrap());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> MockNode {
        MockNode(Arc::new(self))
    }
}

#[derive(Clone)]
pub struct MockNode(Arc<NodeScript>);

impl MockNode {
    /// Number of `eth_getTransactionByHash` calls received.
    pub fn lookups(&self) -> usize {
        self.0.lookups.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.0.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a NodeScript);

impl<'a> InFlight<'a> {
    fn enter(script: &'a NodeScript) -> Self {
        let current = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(script)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxEnvelope>, TransportError> {
        let script = &self.0;
        script.lookups.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(script);

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        if script.failing.contains(&hash) {
            return Err(TransportErrorKind::custom_str("node unavailable"));
        }
        Ok(script.transactions.get(&hash).cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<NodeReceipt>, TransportError> {
        Ok(self.0.receipts.get(&hash).cloned())
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        Ok(self.0.chain_id)
    }
}

/// A store whose every call fails.
pub struct FailingStore;

fn unavailable() -> StoreError {
    StoreError::OutOfRange {
        field: "transaction_hash",
        value: "unavailable".to_string(),
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn find_by_hashes(&self, _: &[String]) -> Result<Vec<TransactionRecord>, StoreError> {
        Err(unavailable())
    }

    async fn insert_many(&self, _: &[TransactionRecord]) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        Err(unavailable())
    }

    async fn find_user_history(&self, _: &str) -> Result<Vec<String>, StoreError> {
        Err(unavailable())
    }

    async fn append_user_history(&self, _: &str, _: &[String]) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn find_user(&self, _: &str) -> Result<Option<User>, StoreError> {
        Err(unavailable())
    }

    async fn insert_user(&self, _: &User) -> Result<bool, StoreError> {
        Err(unavailable())
    }
}

/// Reads from an in-memory store; every transaction write stalls, then fails.
pub struct StallingWrites {
    pub inner: MemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl CacheStore for StallingWrites {
    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.find_by_hashes(hashes).await
    }

    async fn insert_many(&self, _: &[TransactionRecord]) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Err(unavailable())
    }

    async fn all_transactions(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.all_transactions().await
    }

    async fn find_user_history(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        self.inner.find_user_history(user_id).await
    }

    async fn append_user_history(&self, user_id: &str, hashes: &[String]) -> Result<(), StoreError> {
        self.inner.append_user_history(user_id, hashes).await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user(username).await
    }

    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        self.inner.insert_user(user).await
    }
}

pub struct Harness {
    pub service: TransactionService<MockNode>,
    pub store: Arc<MemoryStore>,
    pub node: MockNode,
    pub tokens: HmacTokenAuthority,
    worker: WriteBackWorker,
}

impl Harness {
    pub fn new(store: MemoryStore, node: MockNode) -> Self {
        Self::with_config(store, node, FetchConfig::default())
    }

    pub fn with_config(store: MemoryStore, node: MockNode, config: FetchConfig) -> Self {
        let store = Arc::new(store);
        let (write_back, worker) = setup_write_back(store.clone(), 16, None);
        let fetcher = NodeFetcher::new(node.clone(), &config);
        let service = TransactionService::new(
            store.clone(),
            fetcher,
            Arc::new(HmacTokenAuthority::new(SECRET)),
            write_back,
        );

        Self {
            service,
            store,
            node,
            tokens: HmacTokenAuthority::new(SECRET),
            worker,
        }
    }

    /// Waits until the worker has served `writes` batches, without shutting down.
    pub async fn wait_for_writes(&self, writes: usize) {
        for _ in 0..200 {
            if self.store.transaction_writes() >= writes {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("write-back did not reach {writes} batches");
    }

    /// Shuts the service down and waits for queued write-backs to land.
    pub async fn flush(self) -> Arc<MemoryStore> {
        let Self {
            service,
            store,
            worker,
            ..
        } = self;
        drop(service);
        worker.join().await;
        store
    }
}

/// Builds a service over any store, returning the write-back worker too.
pub fn service_with(
    store: Arc<dyn CacheStore>,
    node: MockNode,
) -> (TransactionService<MockNode>, WriteBackWorker) {
    let (write_back, worker) = setup_write_back(store.clone(), 16, None);
    let service = TransactionService::new(
        store,
        NodeFetcher::new(node, &FetchConfig::default()),
        Arc::new(HmacTokenAuthority::new(SECRET)),
        write_back,
    );
    (service, worker)
}

/// Builds a service over `store` with a node that must never be reached.
pub fn service_over(store: Arc<dyn CacheStore>) -> (TransactionService<MockNode>, MockNode) {
    let node = NodeScript::new(CHAIN_ID).build();
    let (service, _worker) = service_with(store, node.clone());
    (service, node)
}
