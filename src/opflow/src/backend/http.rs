use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use super::{IssuedKey, KeyIssuer, SyncCollaborator, SyncTarget};
use crate::{errors::RelayError, relay::http::read_json};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyRequest<'a> {
    owner_account_id: &'a str,
    wallet_id: &'a str,
}

/// Expiry as sent by the issuer: RFC 3339 string or unix seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum Expiry {
    Unix(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    private_key: String,
    expires_at: Expiry,
    #[serde(default)]
    wallet_address: Option<Address>,
}

#[derive(Deserialize)]
struct AckResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Backend client implementing both the key issuer and the sync collaborator.
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client, base }
    }

    async fn post<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RelayError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base))
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        read_json(response).await
    }
}

fn parse_expiry(expiry: Expiry) -> Result<OffsetDateTime, RelayError> {
    match expiry {
        Expiry::Unix(secs) => OffsetDateTime::from_unix_timestamp(secs)
            .map_err(|e| RelayError::Decode(format!("expiresAt {secs}: {e}"))),
        Expiry::Text(raw) => OffsetDateTime::parse(&raw, &Rfc3339)
            .map_err(|e| RelayError::Decode(format!("expiresAt `{raw}`: {e}"))),
    }
}

fn ack(response: AckResponse, what: &str) -> Result<(), RelayError> {
    if response.success {
        Ok(())
    } else {
        Err(RelayError::Rejected(
            response.message.unwrap_or_else(|| format!("{what} rejected")),
        ))
    }
}

#[async_trait]
impl KeyIssuer for HttpBackend {
    async fn issue(&self, owner_account_id: &str, wallet_id: &str) -> Result<IssuedKey, RelayError> {
        let request = KeyRequest {
            owner_account_id,
            wallet_id,
        };
        let response: IssueResponse = self.post("delegated-keys/issue", &request).await?;
        Ok(IssuedKey {
            private_key: response.private_key,
            expires_at: parse_expiry(response.expires_at)?,
            wallet_address: response.wallet_address,
        })
    }

    async fn create(&self, owner_account_id: &str, wallet_id: &str) -> Result<(), RelayError> {
        let request = KeyRequest {
            owner_account_id,
            wallet_id,
        };
        let response: AckResponse = self.post("delegated-keys/create", &request).await?;
        ack(response, "key creation")
    }
}

#[async_trait]
impl SyncCollaborator for HttpBackend {
    async fn reconcile(&self, target: &SyncTarget) -> Result<(), RelayError> {
        debug!(kind = %target.kind, relay_id = %target.relay_id, "backend sync");
        let response: AckResponse = self.post("sync", target).await?;
        ack(response, "sync")
    }
}
