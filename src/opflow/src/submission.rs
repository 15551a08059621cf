//! Submission client.
//!
//! Posts a signed operation to the relay and extracts the identifier the relay will answer
//! status queries for.

use std::sync::Arc;

use alloy_primitives::B256;
use opflow_types::SignedOperation;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    errors::SubmissionError,
    relay::{RelayApi, SubmitRequest, SubmitResponse},
    utils::ids::parse_hash,
};

/// What the relay accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    /// Identifier to poll with. May differ from `local_hash`.
    pub relay_id: B256,
    pub local_hash: B256,
    pub tx_hash: Option<String>,
}

impl SubmissionReceipt {
    /// The relay tracks the operation under an id other than the entry point hash.
    pub fn diverged(&self) -> bool {
        self.relay_id != self.local_hash
    }
}

pub struct SubmissionClient {
    relay: Arc<dyn RelayApi>,
}

impl SubmissionClient {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self { relay }
    }

    pub async fn submit(&self, signed: &SignedOperation) -> Result<SubmissionReceipt, SubmissionError> {
        let request = SubmitRequest::from_signed(signed);
        let response = self
            .relay
            .submit(&request)
            .await
            .map_err(SubmissionError::Relay)?;

        let receipt = receipt_from_response(signed.hash(), response)?;
        info!(
            relay_id = %receipt.relay_id,
            local_hash = %receipt.local_hash,
            diverged = receipt.diverged(),
            "operation submitted"
        );
        Ok(receipt)
    }
}

fn receipt_from_response(
    local_hash: B256,
    response: SubmitResponse,
) -> Result<SubmissionReceipt, SubmissionError> {
    if let Some(err) = response.error.as_deref().filter(|e| !e.is_empty()) {
        return Err(SubmissionError::Rejected(err.to_string()));
    }
    if response.success == Some(false) {
        let reason = response
            .message
            .unwrap_or_else(|| "relay reported failure".to_string());
        return Err(SubmissionError::Rejected(reason));
    }

    let relay_id = response
        .relay_id
        .as_deref()
        .and_then(parse_hash)
        .or_else(|| response.user_op_hash.as_deref().and_then(parse_hash));

    let Some(relay_id) = relay_id else {
        warn!(?response, "relay response carried no usable identifier");
        return Err(SubmissionError::MalformedResponse(format!(
            "relayId={:?} userOpHash={:?}",
            response.relay_id, response.user_op_hash
        )));
    };

    Ok(SubmissionReceipt {
        relay_id,
        local_hash,
        tx_hash: response.tx_hash,
    })
}
