use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::intent::Spender;

/// Unsigned user operation (ERC-4337 v0.6 field layout).
///
/// The signature is not part of this type: see [`SignedOperation`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub sender: Address,
    /// Chain-assigned replay nonce for `sender`.
    pub nonce: U256,
    /// Wallet deployment code; empty unless the wallet is not deployed yet.
    pub init_code: Bytes,
    /// `execute(target, value, data)` envelope around the intent call.
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// Fee sponsor (paymaster) payload; empty when the wallet pays its own gas.
    pub paymaster_and_data: Bytes,
}

impl Operation {
    pub fn is_sponsored(&self) -> bool {
        !self.paymaster_and_data.is_empty()
    }
}

/// An operation together with its canonical hash and the signature over it.
///
/// Fields are read-only. Changing anything requires [`SignedOperation::into_unsigned`],
/// which discards the signature so the operation must be signed again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    operation: Operation,
    hash: B256,
    signature: Bytes,
}

impl SignedOperation {
    /// Bind a signature to the operation and the canonical hash it was computed over.
    pub fn from_parts(operation: Operation, hash: B256, signature: Bytes) -> Self {
        Self {
            operation,
            hash,
            signature,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Canonical hash reported by the entry point for the unsigned fields.
    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn into_unsigned(self) -> Operation {
        self.operation
    }
}

/// Balance and per-spender allowances read in one gate evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceSnapshot {
    pub base_token_balance: U256,
    pub allowances: BTreeMap<Spender, U256>,
}

impl AllowanceSnapshot {
    pub fn allowance(&self, spender: &Spender) -> U256 {
        self.allowances.get(spender).copied().unwrap_or(U256::ZERO)
    }
}
