use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, B256};
use alloy_provider::Provider;
use alloy_transport::TransportError;
use async_trait::async_trait;

/// The receipt fields a [`TransactionRecord`](crate::models::transactions::TransactionRecord) needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReceipt {
    pub status: bool,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub logs_count: u32,
}

/// The three node calls a per-hash lookup is made of.
///
/// `Ok(None)` means the node answered but does not know the hash.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxEnvelope>, TransportError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<NodeReceipt>, TransportError>;

    async fn chain_id(&self) -> Result<u64, TransportError>;
}

/// [`NodeClient`] over any alloy provider for the Ethereum network.
pub struct AlloyNodeClient<P> {
    provider: P,
}

impl<P> AlloyNodeClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> NodeClient for AlloyNodeClient<P>
where
    P: Provider + Send + Sync,
{
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxEnvelope>, TransportError> {
        let transaction = self.provider.get_transaction_by_hash(hash).await?;

        // The provider already recovered a signer; the fetcher recovers it again
        // against the chain id it reads itself, so only the envelope is kept.
        Ok(transaction.map(|transaction| transaction.inner.into_inner()))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<NodeReceipt>, TransportError> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;

        Ok(receipt.map(|receipt| NodeReceipt {
            status: receipt.inner.status(),
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            logs_count: receipt.inner.logs().len() as u32,
        }))
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        self.provider.get_chain_id().await
    }
}
