use core::fmt;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Deployment progress as seen by the UI.
///
/// Transitions are forward-only (states may be skipped). `AwaitingConfirmation` may repeat while
/// polling, and any non-terminal state may move to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    NotStarted,
    CheckingRequirements,
    CreatingDelegatedKey,
    ApprovingTokens,
    PreparingPayload,
    BuildingOperation,
    Submitting,
    AwaitingConfirmation,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }

    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            DeploymentStatus::Failed => true,
            DeploymentStatus::AwaitingConfirmation => {
                self <= DeploymentStatus::AwaitingConfirmation
            }
            DeploymentStatus::Success => self == DeploymentStatus::AwaitingConfirmation,
            _ => next > self,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::NotStarted => "not-started",
            DeploymentStatus::CheckingRequirements => "checking-requirements",
            DeploymentStatus::CreatingDelegatedKey => "creating-delegated-key",
            DeploymentStatus::ApprovingTokens => "approving-tokens",
            DeploymentStatus::PreparingPayload => "preparing-payload",
            DeploymentStatus::BuildingOperation => "building-operation",
            DeploymentStatus::Submitting => "submitting",
            DeploymentStatus::AwaitingConfirmation => "awaiting-confirmation",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome reported by the relay's status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Success,
    Failed,
    Pending,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayStatus::Success => "success",
            RelayStatus::Failed => "failed",
            RelayStatus::Pending => "pending",
            RelayStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Registration that a locally computed hash and a relay-assigned id name the same operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashLink {
    pub local_hash: B256,
    pub relay_hash: B256,
    pub subject: Address,
}

#[cfg(test)]
mod tests {
    use super::DeploymentStatus::*;
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(NotStarted.can_transition_to(CheckingRequirements));
        assert!(CheckingRequirements.can_transition_to(PreparingPayload));
        assert!(!PreparingPayload.can_transition_to(CheckingRequirements));
        assert!(!Submitting.can_transition_to(Success));
    }

    #[test]
    fn test_awaiting_confirmation_loops() {
        assert!(Submitting.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(Success));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [NotStarted, AwaitingConfirmation, Success, Failed] {
            assert!(!Success.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(BuildingOperation.can_transition_to(Failed));
    }
}
