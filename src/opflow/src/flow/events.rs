use alloy_primitives::B256;
use opflow_types::{DeploymentStatus, HashLink, RelayStatus, Spender};

use crate::{errors::FlowError, gate::GateReport, submission::SubmissionReceipt};

/// Everything a flow reports, on one channel. Nothing is sent after the flow is cancelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    StatusChanged(DeploymentStatus),
    RequirementsEvaluated(GateReport),
    ApprovalSubmitted { spender: Spender, relay_id: B256 },
    Submitted(SubmissionReceipt),
    HashesLinked(HashLink),
    /// `status` is `None` when the check failed on the network.
    PollAttempt {
        attempt: u32,
        status: Option<RelayStatus>,
    },
    Finished(FlowOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowOutcome {
    Succeeded {
        receipt: SubmissionReceipt,
        tx_hash: Option<String>,
    },
    /// Submitted, but the relay never gave a terminal answer within the polling budget.
    StillPending {
        receipt: SubmissionReceipt,
        attempts: u32,
    },
    Failed(FlowError),
    Cancelled,
}

impl FlowOutcome {
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        match self {
            FlowOutcome::Succeeded { receipt, .. } | FlowOutcome::StillPending { receipt, .. } => {
                Some(receipt)
            }
            FlowOutcome::Failed(_) | FlowOutcome::Cancelled => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowOutcome::Succeeded { .. } => "success",
            FlowOutcome::StillPending { .. } => "pending",
            FlowOutcome::Failed(_) => "failed",
            FlowOutcome::Cancelled => "cancelled",
        }
    }
}
