//! Operation signer.
//!
//! Asks the entry point for the canonical hash, signs it as an EIP-191 personal message with the
//! delegated key and recovers the signer again before handing the operation out.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use opflow_types::{Operation, SignedOperation};
use tracing::{debug, error};

use crate::{
    account::constants::SIGNATURE_LEN,
    chain::ChainReader,
    clock::Clock,
    errors::SignError,
    key_store::DelegatedKey,
    utils::crypto::{eip191_digest, recover_address, sign_digest},
};

pub struct OperationSigner {
    chain: Arc<dyn ChainReader>,
    clock: Arc<dyn Clock>,
    entry_point: Address,
}

impl OperationSigner {
    pub fn new(chain: Arc<dyn ChainReader>, clock: Arc<dyn Clock>, entry_point: Address) -> Self {
        Self {
            chain,
            clock,
            entry_point,
        }
    }

    pub async fn sign(
        &self,
        operation: Operation,
        key: &DelegatedKey,
    ) -> Result<SignedOperation, SignError> {
        if self.clock.now() >= key.expires_at() {
            return Err(SignError::KeyExpired);
        }
        if operation.sender != key.wallet_address() {
            return Err(SignError::WrongWallet {
                sender: operation.sender,
                wallet: key.wallet_address(),
            });
        }

        let hash = self
            .chain
            .user_op_hash(self.entry_point, &operation)
            .await
            .map_err(SignError::Hash)?;

        let signature = sign_digest(key.signing_key(), eip191_digest(hash))
            .map_err(|e| SignError::Ecdsa(e.to_string()))?;

        let recovered = recover_signer(hash, &signature)?;
        if recovered != key.signer_address() {
            error!(expected = %key.signer_address(), %recovered, "signature does not recover to the delegated key");
            return Err(SignError::Mismatch {
                expected: key.signer_address(),
                recovered,
            });
        }

        debug!(%hash, signer = %recovered, "operation signed");
        Ok(SignedOperation::from_parts(
            operation,
            hash,
            Bytes::copy_from_slice(&signature),
        ))
    }
}

/// Recover the address that produced `signature` over the personal-message form of `hash`.
pub fn recover_signer(hash: B256, signature: &[u8]) -> Result<Address, SignError> {
    let sig: &[u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| SignError::Ecdsa(format!("signature must be {SIGNATURE_LEN} bytes")))?;
    recover_address(eip191_digest(hash), sig).map_err(|e| SignError::Ecdsa(e.to_string()))
}
