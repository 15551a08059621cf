//! Shared utilities for the orchestrator.
//!
//! These helpers are small and deterministic; nothing here performs I/O.

pub mod crypto;
pub mod ids;
