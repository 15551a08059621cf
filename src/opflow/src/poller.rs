//! Status poller.
//!
//! Asks the relay for the status of a submitted operation on a fixed interval until it reaches a
//! terminal state, the attempt budget runs out, or the flow is torn down. Running out of budget
//! is reported as [`PollOutcome::StillPending`], never as a failure.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use opflow_types::{HashLink, IntentKind, RelayStatus};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    backend::{SyncCollaborator, SyncTarget},
    cancel::Liveness,
    config::PollingConfig,
    reconciler::HashReconciler,
    relay::{RelayApi, StatusResponse},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PollOutcome {
    Confirmed { tx_hash: Option<String> },
    Failed { reason: String },
    /// Budget exhausted without a terminal answer. The operation may still land.
    StillPending { attempts: u32 },
    Cancelled,
}

/// What to poll for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollTarget {
    pub kind: IntentKind,
    pub wallet: Address,
    /// Identifier the relay answers for.
    pub relay_id: B256,
    /// Entry point hash; checked as a fallback when it differs from `relay_id`.
    pub local_hash: B256,
    /// Ask the backend to reconcile the entity once polling ends.
    pub sync_on_finish: bool,
}

impl PollTarget {
    fn secondary(&self) -> Option<B256> {
        (self.local_hash != self.relay_id).then_some(self.local_hash)
    }
}

/// Progress callbacks. Both default to no-ops.
pub trait PollObserver: Send + Sync {
    /// `status` is `None` when the attempt failed on the network.
    fn attempt(&self, _attempt: u32, _status: Option<RelayStatus>) {}

    fn linked(&self, _link: &HashLink) {}
}

impl PollObserver for () {}

pub struct StatusPoller {
    relay: Arc<dyn RelayApi>,
    reconciler: Arc<HashReconciler>,
    sync: Arc<dyn SyncCollaborator>,
    config: PollingConfig,
}

impl StatusPoller {
    pub fn new(
        relay: Arc<dyn RelayApi>,
        reconciler: Arc<HashReconciler>,
        sync: Arc<dyn SyncCollaborator>,
        config: PollingConfig,
    ) -> Self {
        Self {
            relay,
            reconciler,
            sync,
            config,
        }
    }

    pub async fn poll(
        &self,
        target: &PollTarget,
        liveness: &Liveness,
        observer: &dyn PollObserver,
    ) -> PollOutcome {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut teardown = liveness.clone();

        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                _ = teardown.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let response = self.relay.check_status(target.relay_id).await;
            if !liveness.is_live() {
                return PollOutcome::Cancelled;
            }

            let status = match response {
                Ok(status) => status,
                Err(err) => {
                    warn!(attempt, relay_id = %target.relay_id, error = %err, "status check failed");
                    observer.attempt(attempt, None);
                    continue;
                }
            };
            observer.attempt(attempt, Some(status.status));
            debug!(attempt, relay_id = %target.relay_id, status = %status.status, "status checked");

            match status.status {
                RelayStatus::Success => return self.confirm(target, status.tx_hash).await,
                RelayStatus::Failed => {
                    let Some(secondary) = target.secondary() else {
                        return failed(&status, None);
                    };
                    match self.check_secondary(secondary, liveness).await {
                        Secondary::Cancelled => return PollOutcome::Cancelled,
                        Secondary::Answered(s) if s.status == RelayStatus::Success => {
                            return self.confirm(target, s.tx_hash).await;
                        }
                        Secondary::Answered(s) if s.status == RelayStatus::Failed => {
                            return failed(&status, Some(&s));
                        }
                        _ => {}
                    }
                }
                RelayStatus::Pending => {
                    self.ensure_linked(target, observer).await;
                    if !liveness.is_live() {
                        return PollOutcome::Cancelled;
                    }
                }
                // Not terminal: the relay may simply not know the id yet.
                RelayStatus::Unknown => {
                    if let Some(secondary) = target.secondary() {
                        match self.check_secondary(secondary, liveness).await {
                            Secondary::Cancelled => return PollOutcome::Cancelled,
                            Secondary::Answered(s) if s.status == RelayStatus::Success => {
                                return self.confirm(target, s.tx_hash).await;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        info!(
            relay_id = %target.relay_id,
            attempts = self.config.max_attempts,
            "status budget exhausted; operation still pending"
        );
        self.reconcile(target, None, "pending").await;
        PollOutcome::StillPending {
            attempts: self.config.max_attempts,
        }
    }

    async fn check_secondary(&self, id: B256, liveness: &Liveness) -> Secondary {
        let response = self.relay.check_status(id).await;
        if !liveness.is_live() {
            return Secondary::Cancelled;
        }
        match response {
            Ok(status) => {
                debug!(secondary = %id, status = %status.status, "secondary id checked");
                Secondary::Answered(status)
            }
            Err(err) => {
                warn!(secondary = %id, error = %err, "secondary status check failed");
                Secondary::Unavailable
            }
        }
    }

    async fn ensure_linked(&self, target: &PollTarget, observer: &dyn PollObserver) {
        if self
            .reconciler
            .is_linked(target.local_hash, target.relay_id)
            .await
        {
            return;
        }
        match self
            .reconciler
            .link(target.local_hash, target.relay_id, target.wallet)
            .await
        {
            Ok(Some(link)) => observer.linked(&link),
            Ok(None) => {}
            Err(err) => warn!(relay_id = %target.relay_id, error = %err, "hash link failed; will retry"),
        }
    }

    async fn confirm(&self, target: &PollTarget, tx_hash: Option<String>) -> PollOutcome {
        info!(relay_id = %target.relay_id, tx_hash = ?tx_hash, "operation confirmed");
        self.reconcile(target, tx_hash.clone(), "confirmed").await;
        PollOutcome::Confirmed { tx_hash }
    }

    async fn reconcile(&self, target: &PollTarget, tx_hash: Option<String>, observed: &str) {
        if !target.sync_on_finish {
            return;
        }
        let sync = SyncTarget {
            kind: target.kind,
            wallet: target.wallet,
            relay_id: target.relay_id,
            local_hash: target.local_hash,
            tx_hash,
            observed: observed.to_string(),
        };
        if let Err(err) = self.sync.reconcile(&sync).await {
            warn!(relay_id = %target.relay_id, error = %err, "status synchronisation failed");
        }
    }
}

enum Secondary {
    Answered(StatusResponse),
    Unavailable,
    Cancelled,
}

fn failed(primary: &StatusResponse, secondary: Option<&StatusResponse>) -> PollOutcome {
    let reason = primary
        .message
        .clone()
        .or_else(|| secondary.and_then(|s| s.message.clone()))
        .unwrap_or_else(|| "relay reported the operation failed".to_string());
    PollOutcome::Failed { reason }
}
