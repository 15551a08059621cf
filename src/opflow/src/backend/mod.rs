//! Backend collaborators: delegated-key issuance and on-chain status synchronisation.

pub mod http;

use core::fmt;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use opflow_types::IntentKind;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::RelayError;

pub use http::HttpBackend;

/// Raw credential handed out by the issuer.
#[derive(Clone)]
pub struct IssuedKey {
    /// Hex-encoded secp256k1 secret.
    pub private_key: String,
    pub expires_at: OffsetDateTime,
    /// Present when the wallet was provisioned (or discovered) during issuance.
    pub wallet_address: Option<Address>,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("private_key", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("wallet_address", &self.wallet_address)
            .finish()
    }
}

#[async_trait]
pub trait KeyIssuer: Send + Sync {
    /// Issue (or re-issue) a delegated key for the wallet.
    async fn issue(&self, owner_account_id: &str, wallet_id: &str) -> Result<IssuedKey, RelayError>;

    /// Explicitly create a fresh key when issuance fails (e.g. none registered yet).
    async fn create(&self, owner_account_id: &str, wallet_id: &str) -> Result<(), RelayError>;
}

/// Entity whose on-chain status the backend should reconcile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    pub kind: IntentKind,
    pub wallet: Address,
    pub relay_id: B256,
    pub local_hash: B256,
    pub tx_hash: Option<String>,
    /// `confirmed` or `pending`.
    pub observed: String,
}

/// Fire-and-forget reconciliation. Callers log failures and never retry.
#[async_trait]
pub trait SyncCollaborator: Send + Sync {
    async fn reconcile(&self, target: &SyncTarget) -> Result<(), RelayError>;
}
