use alloy_consensus::Transaction as _;
use alloy_consensus::TxEnvelope;
use alloy_consensus::transaction::SignerRecoverable;
use alloy_primitives::Address;
use tracing::debug;

use crate::models::errors::FetchError;

/// How a transaction's signature is interpreted on a given chain.
///
/// Selecting a scheme only validates the transaction against the node's chain
/// id; the sender is then recovered from the envelope's own signing hash,
/// which already encodes the scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerScheme {
    /// Legacy transaction without replay protection
    Homestead,
    /// Legacy transaction with the chain id folded into `v`
    Eip155 { chain_id: u64 },
    /// Typed (EIP-2718) transaction carrying an explicit chain id
    Typed { chain_id: u64 },
}

impl SignerScheme {
    /// Picks the scheme for `envelope` on the chain the node reports.
    ///
    /// A transaction signed for another chain is rejected rather than
    /// recovered to an unrelated address.
    pub fn for_chain(envelope: &TxEnvelope, node_chain_id: u64) -> Result<Self, FetchError> {
        let scheme = match (envelope, envelope.chain_id()) {
            (TxEnvelope::Legacy(_), None) => return Ok(Self::Homestead),
            (TxEnvelope::Legacy(_), Some(chain_id)) => Self::Eip155 { chain_id },
            (_, Some(chain_id)) => Self::Typed { chain_id },
            (_, None) => Self::Typed { chain_id: node_chain_id },
        };

        match scheme {
            Self::Eip155 { chain_id } | Self::Typed { chain_id } if chain_id != node_chain_id => {
                Err(FetchError::ChainIdMismatch {
                    tx_chain_id: chain_id,
                    node_chain_id,
                })
            }
            _ => Ok(scheme),
        }
    }
}

/// Recovers the sender of `envelope` using the scheme selected for `node_chain_id`.
pub fn recover_sender(envelope: &TxEnvelope, node_chain_id: u64) -> Result<Address, FetchError> {
    let scheme = SignerScheme::for_chain(envelope, node_chain_id)?;
    let sender = envelope.recover_signer()?;
    debug!("Recovered sender {} using {:?}", sender, scheme);
    Ok(sender)
}
