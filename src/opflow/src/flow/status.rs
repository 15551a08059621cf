//! Status tracking for one flow.

use opflow_types::{DeploymentStatus, HashLink, RelayStatus};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::events::FlowEvent;
use crate::{cancel::Liveness, errors::FlowError, poller::PollObserver};

/// Owns a flow's [`DeploymentStatus`] and its event sender.
///
/// Every mutation checks liveness first, so once the flow is torn down the status freezes and
/// no further events go out.
pub struct StatusTracker {
    status: watch::Sender<DeploymentStatus>,
    events: mpsc::UnboundedSender<FlowEvent>,
    liveness: Liveness,
}

impl StatusTracker {
    pub fn new(
        status: watch::Sender<DeploymentStatus>,
        events: mpsc::UnboundedSender<FlowEvent>,
        liveness: Liveness,
    ) -> Self {
        Self {
            status,
            events,
            liveness,
        }
    }

    pub fn current(&self) -> DeploymentStatus {
        *self.status.borrow()
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn ensure_live(&self) -> Result<(), FlowError> {
        if self.liveness.is_live() {
            Ok(())
        } else {
            Err(FlowError::Cancelled)
        }
    }

    pub fn transition(&self, next: DeploymentStatus) -> Result<(), FlowError> {
        self.ensure_live()?;
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(FlowError::InvalidTransition { from, to: next });
        }
        self.status.send_replace(next);
        debug!(%from, to = %next, "status changed");
        self.emit(FlowEvent::StatusChanged(next));
        Ok(())
    }

    /// Send an event if the flow is still live. A dropped receiver is not an error.
    pub fn emit(&self, event: FlowEvent) {
        if self.liveness.is_live() {
            let _ = self.events.send(event);
        }
    }
}

impl PollObserver for StatusTracker {
    fn attempt(&self, attempt: u32, status: Option<RelayStatus>) {
        self.emit(FlowEvent::PollAttempt { attempt, status });
    }

    fn linked(&self, link: &HashLink) {
        self.emit(FlowEvent::HashesLinked(*link));
    }
}
