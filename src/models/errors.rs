use std::fmt;

use alloy_consensus::crypto::RecoveryError;
use alloy_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("decode hex string: {0}")]
    InvalidHex(#[from] alloy_primitives::hex::FromHexError),
    #[error("decode rlp bytes: {0}")]
    InvalidRlp(#[from] alloy_rlp::Error),
}

/// Why a single hash could not be resolved against the node.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid transaction hash")]
    InvalidHash,
    #[error("rpc error calling {method}: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("receipt not found")]
    ReceiptNotFound,
    #[error("receipt is missing block information")]
    PendingReceipt,
    #[error("transaction chain id {tx_chain_id} does not match node chain id {node_chain_id}")]
    ChainIdMismatch { tx_chain_id: u64, node_chain_id: u64 },
    #[error("recover sender: {0}")]
    SenderRecovery(#[from] RecoveryError),
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    TimedOut,
}

#[derive(Debug)]
pub struct HashFailure {
    pub hash: String,
    pub cause: FetchError,
}

impl fmt::Display for HashFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetching transaction {:?}: {}", self.hash, self.cause)
    }
}

/// Every per-hash failure of one node fetch, in completion order.
#[derive(Debug, Default)]
pub struct FetchFailures {
    pub failures: Vec<HashFailure>,
}

impl FetchFailures {
    pub fn push(&mut self, hash: String, cause: FetchError) {
        self.failures.push(HashFailure { hash, cause });
    }

    /// Moves every failure of `other` to the end of this list.
    pub fn append(&mut self, other: FetchFailures) {
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.hash.as_str())
    }

    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl fmt::Display for FetchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchFailures {}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("{field} value {value} does not fit the column type")]
    OutOfRange { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token is not valid: malformed")]
    Malformed,
    #[error("token is not valid: signature mismatch")]
    InvalidSignature,
    #[error("unexpected signing method: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),
    #[error("token has no subject")]
    MissingSubject,
    #[error("encode claims: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("invalid signing key")]
    InvalidKey,
    #[error("user not found: {0}")]
    UnknownUser(String),
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("username already taken: {0}")]
    UserExists(String),
    #[error("password hash: {0}")]
    PasswordHash(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("validate token: {0}")]
    Auth(#[from] AuthError),
}
