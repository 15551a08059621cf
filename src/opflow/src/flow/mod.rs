//! Flow orchestration.
//!
//! An [`Orchestrator`] is built once from an explicit [`FlowContext`] and a set of
//! [`Collaborators`]. Each deployment or approval is a [`FlowHandle`]: started explicitly,
//! cancellable at any time, reporting through one [`FlowEvent`] channel.
//!
//! ```text
//! CheckingRequirements -> CreatingDelegatedKey -> [ApprovingTokens] -> PreparingPayload
//!   -> BuildingOperation -> Submitting -> AwaitingConfirmation -> Success | Failed
//! ```

pub mod events;
pub mod status;

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use opflow_types::{DeploymentStatus, Intent, IntentKind, Spender};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};

pub use events::{FlowEvent, FlowOutcome};
pub use status::StatusTracker;

use crate::{
    backend::{HttpBackend, KeyIssuer, SyncCollaborator},
    builder::{OperationBuilder, WalletRef},
    cancel::{self, CancelSignal, Liveness},
    chain::{ChainReader, RpcChainReader},
    clock::{Clock, SystemClock},
    config::StaticConfig,
    errors::{ConfigError, FlowError, PreconditionError},
    gate::{GateReport, PreconditionGate, Requirements},
    key_store::{DelegatedKey, DelegatedKeyStore},
    poller::{PollOutcome, PollTarget, StatusPoller},
    reconciler::HashReconciler,
    relay::{HttpRelay, RelayApi},
    signer::OperationSigner,
    submission::{SubmissionClient, SubmissionReceipt},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Who the flows run for and under which configuration.
#[derive(Clone, Debug)]
pub struct FlowContext {
    pub owner_account_id: String,
    pub wallet_id: String,
    pub config: StaticConfig,
}

/// External services a flow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainReader>,
    pub relay: Arc<dyn RelayApi>,
    pub issuer: Arc<dyn KeyIssuer>,
    pub sync: Arc<dyn SyncCollaborator>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// HTTP-backed collaborators sharing one connection pool.
    pub fn http(config: &StaticConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;
        let backend = Arc::new(HttpBackend::new(client.clone(), &config.endpoints.backend));
        Ok(Self {
            chain: Arc::new(RpcChainReader::new(client.clone(), &config.endpoints.chain_rpc)),
            relay: Arc::new(HttpRelay::new(client, &config.endpoints.relay)),
            issuer: backend.clone(),
            sync: backend,
            clock: Arc::new(SystemClock),
        })
    }
}

struct Pipeline {
    context: FlowContext,
    key_store: DelegatedKeyStore,
    gate: PreconditionGate,
    builder: OperationBuilder,
    signer: OperationSigner,
    submission: SubmissionClient,
    reconciler: Arc<HashReconciler>,
    poller: StatusPoller,
}

#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
}

impl Orchestrator {
    pub fn new(context: FlowContext, collaborators: Collaborators) -> Self {
        let Collaborators {
            chain,
            relay,
            issuer,
            sync,
            clock,
        } = collaborators;
        let config = &context.config;

        let margin = time::Duration::try_from(Duration::from_secs(
            config.key_store.expiry_margin_secs,
        ))
        .unwrap_or(time::Duration::MAX);
        let reconciler = Arc::new(HashReconciler::new(relay.clone()));

        let pipeline = Pipeline {
            key_store: DelegatedKeyStore::new(issuer, clock.clone(), margin),
            gate: PreconditionGate::from_config(chain.clone(), config),
            builder: OperationBuilder::from_config(chain.clone(), clock.clone(), config),
            signer: OperationSigner::new(chain, clock, config.contracts.entry_point),
            submission: SubmissionClient::new(relay.clone()),
            poller: StatusPoller::new(relay, reconciler.clone(), sync, config.polling),
            reconciler,
            context,
        };
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn config(&self) -> &StaticConfig {
        &self.pipeline.context.config
    }

    pub fn key_store(&self) -> &DelegatedKeyStore {
        &self.pipeline.key_store
    }

    /// Evaluate the gate for `intent` without starting a flow.
    pub async fn check(&self, intent: &Intent, wallet: Address) -> Result<GateReport, FlowError> {
        let requirements = Requirements::for_intent(intent, &self.config().thresholds);
        Ok(self.pipeline.gate.evaluate(wallet, &requirements).await?)
    }

    /// Acquire (or reuse) the delegated key and return the wallet it is scoped to.
    pub async fn resolve_wallet(&self) -> Result<Address, FlowError> {
        let ctx = &self.pipeline.context;
        let key = self
            .pipeline
            .key_store
            .acquire(&ctx.owner_account_id, &ctx.wallet_id)
            .await?;
        Ok(key.wallet_address())
    }

    /// Prepare a flow. Nothing happens until [`FlowHandle::start`].
    pub fn flow(&self, intent: Intent, wallet: WalletRef) -> FlowHandle {
        let (signal, liveness) = cancel::channel();
        let (status_tx, status_rx) = watch::channel(DeploymentStatus::NotStarted);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        FlowHandle {
            pipeline: self.pipeline.clone(),
            pending: Some(PendingFlow {
                intent,
                wallet,
                tracker: StatusTracker::new(status_tx, events_tx, liveness.clone()),
            }),
            signal,
            liveness,
            status: status_rx,
            events: Some(events_rx),
            task: None,
            outcome: None,
        }
    }
}

struct PendingFlow {
    intent: Intent,
    wallet: WalletRef,
    tracker: StatusTracker,
}

/// One running (or runnable) flow.
///
/// Dropping the handle tears the flow down exactly like [`cancel`](Self::cancel).
pub struct FlowHandle {
    pipeline: Arc<Pipeline>,
    pending: Option<PendingFlow>,
    signal: CancelSignal,
    liveness: Liveness,
    status: watch::Receiver<DeploymentStatus>,
    events: Option<mpsc::UnboundedReceiver<FlowEvent>>,
    task: Option<JoinHandle<FlowOutcome>>,
    outcome: Option<FlowOutcome>,
}

impl FlowHandle {
    /// Spawn the flow on the current runtime. Starting twice is a no-op.
    pub fn start(&mut self) {
        let Some(PendingFlow {
            intent,
            wallet,
            tracker,
        }) = self.pending.take()
        else {
            return;
        };
        let pipeline = self.pipeline.clone();
        self.task = Some(tokio::spawn(async move {
            pipeline.run(&intent, &wallet, &tracker).await
        }));
    }

    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        !self.liveness.is_live()
    }

    /// Take the event receiver. There is a single subscriber per flow.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<FlowEvent>> {
        self.events.take()
    }

    pub fn status(&self) -> DeploymentStatus {
        *self.status.borrow()
    }

    /// Wait for the flow to finish. A flow that was never started reports `Cancelled` once
    /// cancelled and fails otherwise.
    pub async fn outcome(&mut self) -> FlowOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(_) if self.is_cancelled() => FlowOutcome::Cancelled,
                Err(join) => FlowOutcome::Failed(FlowError::Internal(join.to_string())),
            },
            None if self.is_cancelled() => FlowOutcome::Cancelled,
            None => FlowOutcome::Failed(FlowError::Internal("flow was never started".to_string())),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for FlowHandle {
    fn drop(&mut self) {
        self.signal.cancel();
    }
}

/// Which operation of a flow is being sent. Approval legs leave the flow status alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Leg {
    Primary,
    Approval,
}

impl Pipeline {
    async fn run(&self, intent: &Intent, wallet: &WalletRef, tracker: &StatusTracker) -> FlowOutcome {
        let outcome = match self.drive(intent, wallet, tracker).await {
            Ok(outcome) => outcome,
            Err(FlowError::Cancelled) => FlowOutcome::Cancelled,
            Err(err) => {
                if tracker.transition(DeploymentStatus::Failed).is_err() && !tracker.liveness().is_live() {
                    return FlowOutcome::Cancelled;
                }
                error!(kind = %intent.kind(), wallet = %wallet.address, error = %err, "flow failed");
                FlowOutcome::Failed(err)
            }
        };
        if !tracker.liveness().is_live() {
            return FlowOutcome::Cancelled;
        }
        tracker.emit(FlowEvent::Finished(outcome.clone()));
        outcome
    }

    async fn drive(
        &self,
        intent: &Intent,
        wallet: &WalletRef,
        tracker: &StatusTracker,
    ) -> Result<FlowOutcome, FlowError> {
        validate_intent(intent)?;
        info!(kind = %intent.kind(), wallet = %wallet.address, "flow started");

        tracker.transition(DeploymentStatus::CheckingRequirements)?;
        let requirements = Requirements::for_intent(intent, &self.context.config.thresholds);
        let report = self.evaluate(wallet.address, &requirements, tracker).await?;
        if !report.has_balance {
            return Err(PreconditionError::NotSatisfied(report.summary()).into());
        }

        tracker.transition(DeploymentStatus::CreatingDelegatedKey)?;
        self.key_store.remember_wallet(wallet.address);
        let key = self
            .key_store
            .acquire(&self.context.owner_account_id, &self.context.wallet_id)
            .await?;
        tracker.ensure_live()?;

        if !report.passed() {
            tracker.transition(DeploymentStatus::ApprovingTokens)?;
            self.satisfy(report, &requirements, wallet, &key, tracker).await?;
        }

        tracker.transition(DeploymentStatus::PreparingPayload)?;
        tracker.transition(DeploymentStatus::BuildingOperation)?;
        let receipt = self.send(intent, wallet, &key, Leg::Primary, tracker).await?;
        tracker.emit(FlowEvent::Submitted(receipt.clone()));

        tracker.transition(DeploymentStatus::AwaitingConfirmation)?;
        let target = PollTarget {
            kind: intent.kind(),
            wallet: wallet.address,
            relay_id: receipt.relay_id,
            local_hash: receipt.local_hash,
            sync_on_finish: true,
        };
        match self.poller.poll(&target, tracker.liveness(), tracker).await {
            PollOutcome::Confirmed { tx_hash } => {
                tracker.transition(DeploymentStatus::Success)?;
                info!(kind = %intent.kind(), relay_id = %receipt.relay_id, "flow succeeded");
                Ok(FlowOutcome::Succeeded { receipt, tx_hash })
            }
            PollOutcome::Failed { reason } => Err(FlowError::OperationFailed(reason)),
            PollOutcome::StillPending { attempts } => {
                warn!(relay_id = %receipt.relay_id, attempts, "no terminal status yet; leaving flow pending");
                Ok(FlowOutcome::StillPending { receipt, attempts })
            }
            PollOutcome::Cancelled => Err(FlowError::Cancelled),
        }
    }

    async fn evaluate(
        &self,
        wallet: Address,
        requirements: &Requirements,
        tracker: &StatusTracker,
    ) -> Result<GateReport, FlowError> {
        let report = self.gate.evaluate(wallet, requirements).await?;
        tracker.ensure_live()?;
        tracker.emit(FlowEvent::RequirementsEvaluated(report.clone()));
        Ok(report)
    }

    /// Build, sign and submit; links the hashes right away when the relay picked its own id.
    async fn send(
        &self,
        intent: &Intent,
        wallet: &WalletRef,
        key: &DelegatedKey,
        leg: Leg,
        tracker: &StatusTracker,
    ) -> Result<SubmissionReceipt, FlowError> {
        let operation = self.builder.build(intent, wallet).await?;
        tracker.ensure_live()?;
        let signed = self.signer.sign(operation, key).await?;
        tracker.ensure_live()?;

        if leg == Leg::Primary {
            tracker.transition(DeploymentStatus::Submitting)?;
        }
        let receipt = self.submission.submit(&signed).await?;
        tracker.ensure_live()?;

        if receipt.diverged() {
            match self
                .reconciler
                .link(receipt.local_hash, receipt.relay_id, wallet.address)
                .await
            {
                Ok(Some(link)) => tracker.emit(FlowEvent::HashesLinked(link)),
                Ok(None) => {}
                Err(err) => {
                    warn!(relay_id = %receipt.relay_id, error = %err, "hash link failed; retrying while pending")
                }
            }
            tracker.ensure_live()?;
        }
        Ok(receipt)
    }

    /// Approve every missing spender (fee sponsor first), then re-check the gate.
    async fn satisfy(
        &self,
        mut report: GateReport,
        requirements: &Requirements,
        wallet: &WalletRef,
        key: &DelegatedKey,
        tracker: &StatusTracker,
    ) -> Result<(), FlowError> {
        let approvals = self.context.config.approvals;
        for round in 1..=approvals.max_rounds {
            let mut missing = report.missing_approvals();
            missing.sort_by_key(|spender| *spender != Spender::FeeSponsor);
            info!(wallet = %wallet.address, round, missing = ?missing, "approving tokens");

            for spender in missing {
                let minimum = requirements.minimum_for(&spender).unwrap_or(U256::ZERO);
                let amount = minimum.saturating_mul(U256::from(approvals.amount_multiplier));
                self.approve(spender, amount, wallet, key, tracker).await?;
            }

            report = self.evaluate(wallet.address, requirements, tracker).await?;
            if report.passed() {
                return Ok(());
            }
            if !report.has_balance {
                break;
            }
        }
        Err(PreconditionError::NotSatisfied(report.summary()).into())
    }

    async fn approve(
        &self,
        spender: Spender,
        amount: U256,
        wallet: &WalletRef,
        key: &DelegatedKey,
        tracker: &StatusTracker,
    ) -> Result<(), FlowError> {
        let intent = Intent::Approve { spender, amount };
        let receipt = self
            .send(&intent, wallet, key, Leg::Approval, tracker)
            .await
            .map_err(|err| match err {
                FlowError::Submission(e) => FlowError::ApprovalFailed {
                    spender,
                    reason: e.to_string(),
                },
                other => other,
            })?;
        tracker.emit(FlowEvent::ApprovalSubmitted {
            spender,
            relay_id: receipt.relay_id,
        });

        let target = PollTarget {
            kind: IntentKind::Approve,
            wallet: wallet.address,
            relay_id: receipt.relay_id,
            local_hash: receipt.local_hash,
            sync_on_finish: false,
        };
        match self.poller.poll(&target, tracker.liveness(), tracker).await {
            PollOutcome::Confirmed { .. } => Ok(()),
            PollOutcome::Failed { reason } => Err(FlowError::ApprovalFailed { spender, reason }),
            // The gate re-check decides whether it landed.
            PollOutcome::StillPending { attempts } => {
                warn!(%spender, attempts, "approval still pending");
                Ok(())
            }
            PollOutcome::Cancelled => Err(FlowError::Cancelled),
        }
    }
}

fn validate_intent(intent: &Intent) -> Result<(), FlowError> {
    let invalid = |msg: &str| Err(FlowError::InvalidIntent(msg.to_string()));
    match intent {
        Intent::Approve { .. } => Ok(()),
        Intent::DeployElection { name, duration, .. } => {
            if name.trim().is_empty() {
                return invalid("election name is empty");
            }
            if *duration == 0 {
                return invalid("election duration is zero");
            }
            Ok(())
        }
        Intent::DeploySession {
            election_contract,
            duration,
            max_voters,
            name,
        } => {
            if *election_contract == Address::ZERO {
                return invalid("session election contract is the zero address");
            }
            if name.trim().is_empty() {
                return invalid("session name is empty");
            }
            if *duration == 0 || *max_voters == 0 {
                return invalid("session duration and max voters must be non-zero");
            }
            Ok(())
        }
    }
}
