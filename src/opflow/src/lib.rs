//! Client-side orchestration of delegated-key signed user operations.
//!
//! A flow checks that the smart-contract wallet holds enough of the base token and has approved
//! the contracts that will pull it, obtains a short-lived delegated signing key, approves missing
//! spenders, builds and signs the operation, submits it through a relay/bundler and polls until
//! the relay reports a terminal status.
//!
//! Components are usable on their own; [`flow::Orchestrator`] wires them together.

pub mod account;
pub mod backend;
pub mod builder;
pub mod cancel;
pub mod chain;
pub mod clock;
pub mod config;
pub mod errors;
pub mod flow;
pub mod gate;
pub mod key_store;
pub mod poller;
pub mod reconciler;
pub mod relay;
pub mod signer;
pub mod submission;
pub mod utils;

#[cfg(test)]
mod tests;

pub use builder::{OperationBuilder, WalletRef};
pub use config::StaticConfig;
pub use errors::FlowError;
pub use flow::{Collaborators, FlowContext, FlowEvent, FlowHandle, FlowOutcome, Orchestrator};
pub use gate::{GateReport, PreconditionGate, Requirements};
pub use key_store::{DelegatedKey, DelegatedKeyStore};
pub use poller::{PollOutcome, PollTarget, StatusPoller};
pub use submission::{SubmissionClient, SubmissionReceipt};

pub use opflow_types::{DeploymentStatus, Intent, IntentKind, Spender};
