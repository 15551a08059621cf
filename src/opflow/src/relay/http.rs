use alloy_primitives::B256;
use async_trait::async_trait;
use opflow_types::HashLink;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{LinkResponse, RelayApi, StatusResponse, SubmitRequest, SubmitResponse};
use crate::errors::RelayError;

/// Relay client over plain HTTP + JSON.
pub struct HttpRelay {
    client: reqwest::Client,
    base: String,
}

impl HttpRelay {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client, base }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }
}

/// Read a JSON body, keeping the raw text of non-2xx responses so callers can surface it verbatim.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RelayError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(RelayError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| RelayError::Decode(format!("{e}: {body}")))
}

fn transport(e: reqwest::Error) -> RelayError {
    RelayError::Transport(e.to_string())
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, RelayError> {
        debug!(sender = %request.operation.sender, hash = %request.user_op_hash, "relay submit");
        let response = self
            .client
            .post(self.url("submit"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn check_status(&self, id: B256) -> Result<StatusResponse, RelayError> {
        let response = self
            .client
            .get(self.url("check-status"))
            .query(&[("id", id.to_string())])
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn link_hashes(&self, link: &HashLink) -> Result<LinkResponse, RelayError> {
        let response = self
            .client
            .post(self.url("link-hashes"))
            .json(link)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }
}
