//! Delegated key store.
//!
//! Hands out a short-lived signing key scoped to one smart-contract wallet. A cached key is
//! returned as-is (same `Arc`) until it expires; after that it is replaced wholesale by a newly
//! issued key, never mutated. Re-issuing mid-flow would invalidate in-flight signatures, so the
//! cache is always consulted first.

use core::fmt;
use std::sync::{Arc, RwLock};

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    backend::{IssuedKey, KeyIssuer},
    clock::Clock,
    errors::KeyIssuanceError,
    utils::crypto::address_of,
};

pub struct DelegatedKey {
    signing_key: SigningKey,
    signer: Address,
    expires_at: OffsetDateTime,
    wallet_address: Address,
}

impl DelegatedKey {
    pub fn new(signing_key: SigningKey, expires_at: OffsetDateTime, wallet_address: Address) -> Self {
        let signer = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            signer,
            expires_at,
            wallet_address,
        }
    }

    pub fn from_hex(
        secret: &str,
        expires_at: OffsetDateTime,
        wallet_address: Address,
    ) -> Result<Self, KeyIssuanceError> {
        let raw = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| KeyIssuanceError::InvalidKeyMaterial(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&raw)
            .map_err(|e| KeyIssuanceError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self::new(signing_key, expires_at, wallet_address))
    }

    /// Address derived from the key material; what signature recovery must yield.
    pub fn signer_address(&self) -> Address {
        self.signer
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }

    /// Valid for at least `margin` beyond `now`. Only freshly issued keys are held to this.
    pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
        now.checked_add(margin)
            .is_some_and(|deadline| deadline < self.expires_at)
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for DelegatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedKey")
            .field("signer", &self.signer)
            .field("expires_at", &self.expires_at)
            .field("wallet_address", &self.wallet_address)
            .finish_non_exhaustive()
    }
}

pub struct DelegatedKeyStore {
    issuer: Arc<dyn KeyIssuer>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    cached: Mutex<Option<Arc<DelegatedKey>>>,
    wallet: RwLock<Option<Address>>,
}

impl DelegatedKeyStore {
    pub fn new(issuer: Arc<dyn KeyIssuer>, clock: Arc<dyn Clock>, margin: Duration) -> Self {
        Self {
            issuer,
            clock,
            margin,
            cached: Mutex::new(None),
            wallet: RwLock::new(None),
        }
    }

    /// Seed the wallet address for issuers that do not report it.
    pub fn with_wallet(self, wallet: Address) -> Self {
        self.set_wallet(wallet);
        self
    }

    /// Record `wallet` unless one is already known. Issuer-reported addresses always win.
    pub fn remember_wallet(&self, wallet: Address) {
        let mut slot = self.wallet.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(wallet);
        }
    }

    /// Last wallet address known to the store (seeded or reported by the issuer).
    pub fn wallet_address(&self) -> Option<Address> {
        *self.wallet.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_wallet(&self, wallet: Address) {
        *self.wallet.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(wallet);
    }

    /// Return the cached key while `now < expires_at`, otherwise issue a new one.
    ///
    /// Issuance failure falls back to creating a new key and retrying issuance once. A second
    /// failure is fatal.
    pub async fn acquire(
        &self,
        owner_account_id: &str,
        wallet_id: &str,
    ) -> Result<Arc<DelegatedKey>, KeyIssuanceError> {
        let mut slot = self.cached.lock().await;
        let now = self.clock.now();

        if let Some(key) = slot.as_ref() {
            if key.is_valid_at(now) {
                return Ok(Arc::clone(key));
            }
            debug!(signer = %key.signer_address(), expires_at = %key.expires_at(), "delegated key expired");
        }

        let issued = match self.issuer.issue(owner_account_id, wallet_id).await {
            Ok(issued) => issued,
            Err(issue) => {
                warn!(wallet_id, error = %issue, "delegated key issuance failed; creating a new key");
                if let Err(create) = self.issuer.create(owner_account_id, wallet_id).await {
                    return Err(KeyIssuanceError::CreateFailed { issue, create });
                }
                self.issuer
                    .issue(owner_account_id, wallet_id)
                    .await
                    .map_err(|retry| KeyIssuanceError::RetryFailed { issue, retry })?
            }
        };

        let key = Arc::new(self.adopt(issued)?);
        if !key.is_usable_at(now, self.margin) {
            return Err(KeyIssuanceError::AlreadyExpired);
        }
        info!(
            signer = %key.signer_address(),
            wallet = %key.wallet_address(),
            expires_at = %key.expires_at(),
            "delegated key issued"
        );
        *slot = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Drop the cached key so the next [`acquire`](Self::acquire) re-issues.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    fn adopt(&self, issued: IssuedKey) -> Result<DelegatedKey, KeyIssuanceError> {
        if let Some(wallet) = issued.wallet_address {
            self.set_wallet(wallet);
        }
        let wallet = self.wallet_address().ok_or(KeyIssuanceError::UnknownWallet)?;
        DelegatedKey::from_hex(&issued.private_key, issued.expires_at, wallet)
    }
}
