use serde::{Deserialize, Serialize};

/// A transaction as served to callers and stored in the cache.
///
/// Records are immutable once written: the store only ever inserts a hash it
/// has not seen before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub status: u64, // 1 = success, 0 = failure
    pub block_hash: String,
    pub block_number: u64,
    pub from: String,
    pub to: Option<String>, // None for contract creation
    pub contract_address: Option<String>,
    pub logs_count: u32,
    pub input: String,
    pub value: String, // Decimal wei, may exceed u128
}
