//! Relay/bundler surface: submit, check-status, link-hashes.

pub mod http;

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use opflow_types::{HashLink, Operation, RelayStatus, SignedOperation};
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

pub use http::HttpRelay;

/// Body of `POST submit`: every operation field, the signature and the locally computed hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub operation: Operation,
    pub signature: Bytes,
    pub user_op_hash: B256,
}

impl SubmitRequest {
    pub fn from_signed(signed: &SignedOperation) -> Self {
        Self {
            operation: signed.operation().clone(),
            signature: signed.signature().clone(),
            user_op_hash: signed.hash(),
        }
    }
}

/// Response of `POST submit`. Relays differ in which fields they fill, so all are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitResponse {
    pub relay_id: Option<String>,
    pub user_op_hash: Option<String>,
    pub tx_hash: Option<String>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Response of `GET check-status?id=`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: RelayStatus,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST link-hashes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, RelayError>;

    async fn check_status(&self, id: B256) -> Result<StatusResponse, RelayError>;

    async fn link_hashes(&self, link: &HashLink) -> Result<LinkResponse, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use serde_json::json;

    #[test]
    fn test_submit_request_is_flat_camel_case() {
        let op = Operation {
            sender: Address::repeat_byte(0x01),
            nonce: U256::from(7u64),
            ..Operation::default()
        };
        let signed = SignedOperation::from_parts(op, B256::repeat_byte(0x02), Bytes::from(vec![1u8; 65]));
        let value = serde_json::to_value(SubmitRequest::from_signed(&signed)).unwrap();

        assert_eq!(value["sender"], json!(Address::repeat_byte(0x01)));
        assert_eq!(value["nonce"], json!("0x7"));
        assert_eq!(value["paymasterAndData"], json!("0x"));
        assert_eq!(value["userOpHash"], json!(B256::repeat_byte(0x02)));
        assert!(value.get("operation").is_none());
    }

    #[test]
    fn test_status_response_tolerates_unknown_states() {
        let parsed: StatusResponse =
            serde_json::from_value(json!({ "status": "queued" })).unwrap();
        assert_eq!(parsed.status, RelayStatus::Unknown);

        let parsed: StatusResponse =
            serde_json::from_value(json!({ "status": "success", "txHash": "0xabc" })).unwrap();
        assert_eq!(parsed.status, RelayStatus::Success);
        assert_eq!(parsed.tx_hash.as_deref(), Some("0xabc"));
    }
}
