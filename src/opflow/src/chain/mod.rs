//! Read-only chain access used by the gate, the builder and the signer.

pub mod rpc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use opflow_types::Operation;

use crate::errors::ChainError;

pub use rpc::RpcChainReader;

/// Fee parameters for operations whose gas is not fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Chain reads, implemented over JSON-RPC in production and in memory in tests.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;

    /// Preferred nonce shape: `EntryPoint.getNonce(sender, key)`.
    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> Result<U256, ChainError>;

    /// Legacy nonce shape: the wallet's own `getNonce()`.
    async fn wallet_nonce(&self, wallet: Address) -> Result<U256, ChainError>;

    /// Canonical operation hash as computed by the entry point.
    async fn user_op_hash(
        &self,
        entry_point: Address,
        operation: &Operation,
    ) -> Result<B256, ChainError>;

    async fn code_size(&self, address: Address) -> Result<usize, ChainError>;

    async fn gas_fees(&self) -> Result<GasFees, ChainError>;
}
