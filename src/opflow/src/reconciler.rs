//! Hash reconciler.
//!
//! Registers with the relay that a locally computed hash and a relay-assigned id name the same
//! operation. A pair is registered at most once per process.

use std::{collections::HashSet, sync::Arc};

use alloy_primitives::{Address, B256};
use opflow_types::HashLink;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{errors::RelayError, relay::RelayApi};

pub struct HashReconciler {
    relay: Arc<dyn RelayApi>,
    linked: Mutex<HashSet<(B256, B256)>>,
}

impl HashReconciler {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self {
            relay,
            linked: Mutex::new(HashSet::new()),
        }
    }

    /// Link `local_hash` to `relay_hash`. Returns `None` when they are equal.
    ///
    /// The registry lock is held across the request so two concurrent calls for the same pair
    /// still produce a single registration.
    pub async fn link(
        &self,
        local_hash: B256,
        relay_hash: B256,
        subject: Address,
    ) -> Result<Option<HashLink>, RelayError> {
        if local_hash == relay_hash {
            return Ok(None);
        }
        let link = HashLink {
            local_hash,
            relay_hash,
            subject,
        };

        let mut linked = self.linked.lock().await;
        if linked.contains(&(local_hash, relay_hash)) {
            debug!(%local_hash, %relay_hash, "hashes already linked");
            return Ok(Some(link));
        }

        let response = self.relay.link_hashes(&link).await?;
        if !response.success {
            return Err(RelayError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "link-hashes refused".to_string()),
            ));
        }
        linked.insert((local_hash, relay_hash));
        info!(%local_hash, %relay_hash, %subject, "hashes linked");
        Ok(Some(link))
    }

    pub async fn is_linked(&self, local_hash: B256, relay_hash: B256) -> bool {
        local_hash == relay_hash || self.linked.lock().await.contains(&(local_hash, relay_hash))
    }
}
