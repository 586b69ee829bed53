use crate::models::errors::FetchError;

const HASH_HEX_LEN: usize = 64;

/// Returns the cache key form of a transaction hash: `0x` followed by 64
/// lowercase hex digits.
///
/// Upper- and mixed-case digits are folded; a missing `0x` prefix or any other
/// length is rejected.
pub fn canonical_hash(hash: &str) -> Result<String, FetchError> {
    let digits = hash.strip_prefix("0x").ok_or(FetchError::InvalidHash)?;
    if digits.len() != HASH_HEX_LEN || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FetchError::InvalidHash);
    }

    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}
