use std::sync::Arc;

use alloy_primitives::{Bytes, B256};
use opflow_types::{Operation, SignedOperation};

use super::mocks::*;
use crate::{
    errors::{RelayError, SubmissionError},
    relay::SubmitResponse,
    submission::SubmissionClient,
};

fn signed() -> SignedOperation {
    SignedOperation::from_parts(
        Operation {
            sender: wallet(),
            ..Default::default()
        },
        B256::repeat_byte(0x10),
        Bytes::from(vec![0u8; 65]),
    )
}

#[tokio::test]
async fn test_echoed_hash_is_accepted() {
    let relay = Arc::new(MockRelay::new(RelayIds::Echo));
    let receipt = SubmissionClient::new(relay.clone())
        .submit(&signed())
        .await
        .unwrap();
    assert_eq!(receipt.relay_id, B256::repeat_byte(0x10));
    assert!(!receipt.diverged());
    assert_eq!(relay.submitted()[0].user_op_hash, B256::repeat_byte(0x10));
}

#[tokio::test]
async fn test_relay_id_preferred_over_echo() {
    let relay = Arc::new(MockRelay::new(RelayIds::Diverge));
    let receipt = SubmissionClient::new(relay).submit(&signed()).await.unwrap();
    assert_eq!(receipt.relay_id, relay_id_for(B256::repeat_byte(0x10)));
    assert_eq!(receipt.local_hash, B256::repeat_byte(0x10));
    assert!(receipt.diverged());
}

#[tokio::test]
async fn test_unusable_identifiers_are_malformed() {
    let relay = Arc::new(MockRelay::new(RelayIds::Echo));
    relay.push_submit(Ok(SubmitResponse {
        relay_id: Some("job-17".into()),
        user_op_hash: Some("0x1234".into()),
        ..Default::default()
    }));
    let err = SubmissionClient::new(relay).submit(&signed()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_rejection_message_is_verbatim() {
    let relay = Arc::new(MockRelay::new(RelayIds::Echo));
    relay.push_submit(Ok(SubmitResponse {
        success: Some(false),
        message: Some("AA21 didn't pay prefund".into()),
        ..Default::default()
    }));
    relay.push_submit(Ok(SubmitResponse {
        error: Some("AA25 invalid account nonce".into()),
        ..Default::default()
    }));
    let client = SubmissionClient::new(relay);

    assert_eq!(
        client.submit(&signed()).await.unwrap_err(),
        SubmissionError::Rejected("AA21 didn't pay prefund".into())
    );
    assert_eq!(
        client.submit(&signed()).await.unwrap_err(),
        SubmissionError::Rejected("AA25 invalid account nonce".into())
    );
}

#[tokio::test]
async fn test_transport_failure_surfaces_as_relay_error() {
    let relay = Arc::new(MockRelay::new(RelayIds::Echo));
    relay.push_submit(Err(RelayError::Status {
        status: 502,
        body: "bad gateway".into(),
    }));
    let err = SubmissionClient::new(relay).submit(&signed()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Relay(RelayError::Status { status: 502, .. })));
}
