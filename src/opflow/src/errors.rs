//! Error taxonomy for the orchestrator.
//!
//! Each pipeline stage has its own error enum; [`FlowError`] folds them together and prefixes
//! every message with a human-readable category.

use alloy_primitives::Address;
use opflow_types::{DeploymentStatus, Spender};
use thiserror::Error;

/// Errors during chain reads (JSON-RPC).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The call reverted; usually the target does not support the selector.
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// The call succeeded but returned no data (no code or no such function).
    #[error("empty return data from {0}")]
    EmptyReturn(Address),
    /// Return data was malformed or could not be decoded.
    #[error("malformed return data: {0}")]
    MalformedReturn(String),
}

impl ChainError {
    /// Whether this failure means "the contract does not support this call shape".
    pub fn is_unsupported_call(&self) -> bool {
        matches!(self, ChainError::Reverted(_) | ChainError::EmptyReturn(_))
    }
}

/// Errors talking to the relay or the backend over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Errors acquiring a delegated key. Never retried beyond the create-then-retry fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyIssuanceError {
    #[error("issuance failed ({issue}); creating a new key also failed ({create})")]
    CreateFailed { issue: RelayError, create: RelayError },
    #[error("issuance failed ({issue}); retry after creating a new key failed ({retry})")]
    RetryFailed { issue: RelayError, retry: RelayError },
    #[error("issued key material is invalid: {0}")]
    InvalidKeyMaterial(String),
    #[error("issued key is already expired")]
    AlreadyExpired,
    #[error("issuer did not report a wallet address and none is known")]
    UnknownWallet,
}

/// Errors evaluating or satisfying the precondition gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("an evaluation is already running for wallet {0}")]
    EvaluationInProgress(Address),
    #[error("balance read failed: {0}")]
    BalanceRead(ChainError),
    #[error("allowance read for required spender {spender} failed: {source}")]
    AllowanceRead { spender: Spender, source: ChainError },
    #[error("not yet satisfied: {0}")]
    NotSatisfied(String),
}

/// Both nonce query shapes failed (or the first failed for a reason other than "unsupported").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe_nonce_failure(.entry_point, .wallet))]
pub struct NonceError {
    pub entry_point: ChainError,
    pub wallet: Option<ChainError>,
}

fn describe_nonce_failure(entry_point: &ChainError, wallet: &Option<ChainError>) -> String {
    match wallet {
        Some(w) => format!("getNonce(address,uint192) failed: {entry_point}; getNonce() failed: {w}"),
        None => format!("getNonce(address,uint192) failed: {entry_point}"),
    }
}

/// Errors assembling an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Nonce(#[from] NonceError),
    #[error("chain read failed: {0}")]
    Chain(ChainError),
}

/// Errors signing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("canonical hash query failed: {0}")]
    Hash(ChainError),
    #[error("delegated key expired before signing")]
    KeyExpired,
    #[error("operation sender {sender} is not the key's wallet {wallet}")]
    WrongWallet { sender: Address, wallet: Address },
    #[error("ecdsa failure: {0}")]
    Ecdsa(String),
    #[error("recovered signer {recovered} does not match key address {expected}")]
    Mismatch { expected: Address, recovered: Address },
}

/// Errors submitting a signed operation to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("relay response carried no usable identifier: {0}")]
    MalformedResponse(String),
    #[error("relay rejected operation: {0}")]
    Rejected(String),
    #[error("relay unavailable: {0}")]
    Relay(RelayError),
}

/// Errors loading or validating static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed reading {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("failed parsing config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level flow error. `Display` always starts with a category prefix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("key issuance: {0}")]
    KeyIssuance(#[from] KeyIssuanceError),
    #[error("precondition: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("nonce: {0}")]
    Nonce(NonceError),
    #[error("chain: {0}")]
    Chain(ChainError),
    #[error("signature verification: {0}")]
    SignatureVerification(SignError),
    #[error("submission: {0}")]
    Submission(#[from] SubmissionError),
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
    #[error("approval of {spender} failed: {reason}")]
    ApprovalFailed { spender: Spender, reason: String },
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
    #[error("flow cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

impl From<BuildError> for FlowError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Nonce(e) => FlowError::Nonce(e),
            BuildError::Chain(e) => FlowError::Chain(e),
        }
    }
}

impl From<SignError> for FlowError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::Hash(e) => FlowError::Chain(e),
            other => FlowError::SignatureVerification(other),
        }
    }
}
