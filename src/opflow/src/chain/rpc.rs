//! JSON-RPC chain reader.
//!
//! Every contract read is an `eth_call` against `latest`, encoded and decoded with the ABI
//! definitions in [`crate::account::interfaces`].

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use opflow_types::Operation;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::{ChainReader, GasFees};
use crate::{
    account::{
        constants::NONCE_KEY,
        interfaces::{user_operation, IEntryPoint, ISmartWallet, IERC20},
    },
    errors::ChainError,
};

/// JSON-RPC error code geth uses for reverted calls.
const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct RpcChainReader {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcChainReader {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!("{method}: http {status}")));
        }
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(format!("{method}: {e}")))?;

        if let Some(err) = parsed.error {
            let reverted = err.code == EXECUTION_REVERTED_CODE
                || err.message.to_ascii_lowercase().contains("revert");
            return Err(if reverted {
                ChainError::Reverted(err.message)
            } else {
                ChainError::Rpc {
                    code: err.code,
                    message: err.message,
                }
            });
        }
        let result = parsed
            .result
            .ok_or_else(|| ChainError::MalformedReturn(format!("{method}: missing result")))?;
        serde_json::from_value(result)
            .map_err(|e| ChainError::MalformedReturn(format!("{method}: {e}")))
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, ChainError> {
        let out: Bytes = self
            .request(
                "eth_call",
                json!([{ "to": to, "data": Bytes::from(data) }, "latest"]),
            )
            .await?;
        if out.is_empty() {
            return Err(ChainError::EmptyReturn(to));
        }
        Ok(out)
    }

    async fn quantity(&self, method: &str) -> Result<U256, ChainError> {
        self.request(method, json!([])).await
    }
}

fn malformed(e: alloy_sol_types::Error) -> ChainError {
    ChainError::MalformedReturn(e.to_string())
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let out = self
            .call(token, IERC20::balanceOfCall { account: owner }.abi_encode())
            .await?;
        let decoded = IERC20::balanceOfCall::abi_decode_returns(&out, true).map_err(malformed)?;
        Ok(decoded.balance)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let out = self
            .call(token, IERC20::allowanceCall { owner, spender }.abi_encode())
            .await?;
        let decoded = IERC20::allowanceCall::abi_decode_returns(&out, true).map_err(malformed)?;
        Ok(decoded.remaining)
    }

    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> Result<U256, ChainError> {
        let call = IEntryPoint::getNonceCall {
            sender,
            key: NONCE_KEY,
        };
        let out = self.call(entry_point, call.abi_encode()).await?;
        let decoded = IEntryPoint::getNonceCall::abi_decode_returns(&out, true).map_err(malformed)?;
        Ok(decoded.nonce)
    }

    async fn wallet_nonce(&self, wallet: Address) -> Result<U256, ChainError> {
        let out = self
            .call(wallet, ISmartWallet::getNonceCall {}.abi_encode())
            .await?;
        let decoded =
            ISmartWallet::getNonceCall::abi_decode_returns(&out, true).map_err(malformed)?;
        Ok(decoded.nonce)
    }

    async fn user_op_hash(
        &self,
        entry_point: Address,
        operation: &Operation,
    ) -> Result<B256, ChainError> {
        let call = IEntryPoint::getUserOpHashCall {
            userOp: user_operation(operation),
        };
        let out = self.call(entry_point, call.abi_encode()).await?;
        let decoded =
            IEntryPoint::getUserOpHashCall::abi_decode_returns(&out, true).map_err(malformed)?;
        debug!(sender = %operation.sender, hash = %decoded.opHash, "canonical operation hash");
        Ok(decoded.opHash)
    }

    async fn code_size(&self, address: Address) -> Result<usize, ChainError> {
        let code: Bytes = self
            .request("eth_getCode", json!([address, "latest"]))
            .await?;
        Ok(code.len())
    }

    async fn gas_fees(&self) -> Result<GasFees, ChainError> {
        let gas_price = self.quantity("eth_gasPrice").await?;
        // Older nodes lack eth_maxPriorityFeePerGas; treat the whole price as tip there.
        let priority = match self.quantity("eth_maxPriorityFeePerGas").await {
            Ok(p) => p,
            Err(e) if matches!(e, ChainError::Rpc { .. }) => gas_price,
            Err(e) => return Err(e),
        };
        Ok(GasFees {
            max_fee_per_gas: gas_price + priority,
            max_priority_fee_per_gas: priority,
        })
    }
}
