use alloy_primitives::{Bytes, hex};

use crate::models::errors::DecodeError;

/// Decodes a hex-encoded RLP list of raw hashes into `0x`-prefixed strings.
///
/// The payload must be exactly one list of byte strings; trailing bytes are
/// rejected. Nothing is returned on error.
pub fn decode_hash_batch(token: &str) -> Result<Vec<String>, DecodeError> {
    let data = hex::decode(token.trim())?;
    let raw_hashes: Vec<Bytes> = alloy_rlp::decode_exact(&data)?;

    Ok(raw_hashes.iter().map(hex::encode_prefixed).collect())
}

/// Inverse of [`decode_hash_batch`], used by operators to build lookup tokens.
pub fn encode_hash_batch<S: AsRef<str>>(hashes: &[S]) -> Result<String, DecodeError> {
    let raw_hashes = hashes
        .iter()
        .map(|hash| hex::decode(hash.as_ref()).map(Bytes::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hex::encode(alloy_rlp::encode(&raw_hashes)))
}
