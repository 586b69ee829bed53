use alloy_consensus::Transaction as _;
use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, hex};

use crate::fetcher::rpc::NodeReceipt;
use crate::models::errors::FetchError;
use crate::models::transactions::TransactionRecord;

pub trait RecordTransformer {
    fn into_record(self, receipt: NodeReceipt, from: Address) -> Result<TransactionRecord, FetchError>;
}

impl RecordTransformer for &TxEnvelope {
    fn into_record(self, receipt: NodeReceipt, from: Address) -> Result<TransactionRecord, FetchError> {
        let block_hash = receipt.block_hash.ok_or(FetchError::PendingReceipt)?;
        let block_number = receipt.block_number.ok_or(FetchError::PendingReceipt)?;

        Ok(TransactionRecord {
            hash: hex::encode_prefixed(self.tx_hash()),
            status: u64::from(receipt.status),
            block_hash: hex::encode_prefixed(block_hash),
            block_number,
            from: from.to_checksum(None),
            to: self.to().map(|to| to.to_checksum(None)),
            // Receipts report the zero address when no contract was created
            contract_address: receipt
                .contract_address
                .filter(|address| *address != Address::ZERO)
                .map(|address| address.to_checksum(None)),
            logs_count: receipt.logs_count,
            input: hex::encode_prefixed(self.input()),
            value: self.value().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{Signed, TxLegacy};
    use alloy_primitives::{B256, Bytes, Signature, TxKind, U256};
    use assert_matches::assert_matches;

    fn contract_creation() -> TxEnvelope {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 1,
            gas_limit: 100_000,
            to: TxKind::Create,
            value: U256::from(10u64).pow(U256::from(30u64)),
            input: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
        };
        TxEnvelope::Legacy(Signed::new_unchecked(
            tx,
            Signature::new(U256::from(1u64), U256::from(1u64), false),
            B256::repeat_byte(0xab),
        ))
    }

    fn mined_receipt() -> NodeReceipt {
        NodeReceipt {
            status: true,
            block_hash: Some(B256::repeat_byte(0x01)),
            block_number: Some(17_000_000),
            contract_address: Some(Address::repeat_byte(0x42)),
            logs_count: 3,
        }
    }

    #[test]
    fn maps_contract_creation() {
        let from = Address::repeat_byte(0x33);
        let record = (&contract_creation())
            .into_record(mined_receipt(), from)
            .unwrap();

        assert_eq!(record.hash, format!("0x{}", "ab".repeat(32)));
        assert_eq!(record.status, 1);
        assert_eq!(record.block_number, 17_000_000);
        assert_eq!(record.from, from.to_checksum(None));
        assert_eq!(record.to, None);
        assert_eq!(
            record.contract_address,
            Some(Address::repeat_byte(0x42).to_checksum(None))
        );
        assert_eq!(record.logs_count, 3);
        assert_eq!(record.input, "0x60806040");
        assert_eq!(record.value, "1000000000000000000000000000000");
    }

    #[test]
    fn zero_contract_address_is_dropped() {
        let receipt = NodeReceipt {
            contract_address: Some(Address::ZERO),
            ..mined_receipt()
        };
        let record = (&contract_creation())
            .into_record(receipt, Address::ZERO)
            .unwrap();

        assert_eq!(record.contract_address, None);
    }

    #[test]
    fn receipt_without_block_is_pending() {
        let receipt = NodeReceipt {
            block_number: None,
            ..mined_receipt()
        };

        assert_matches!(
            (&contract_creation()).into_record(receipt, Address::ZERO),
            Err(FetchError::PendingReceipt)
        );
    }
}
