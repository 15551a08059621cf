//! Shared types for operations, intents, allowance snapshots and deployment status.

pub mod intent;
pub mod operation;
pub mod status;

pub use intent::{Intent, IntentKind, Spender};
pub use operation::{AllowanceSnapshot, Operation, SignedOperation};
pub use status::{DeploymentStatus, HashLink, RelayStatus};
