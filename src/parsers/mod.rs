pub mod hash_batch;
pub mod tx_hash;

pub use hash_batch::decode_hash_batch;
pub use tx_hash::canonical_hash;
