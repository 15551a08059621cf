//! ERC-4337 smart-account compatibility shims.
//!
//! Keeps the Solidity ABI expectations (entry point, wallet, token, factories) in one place so the
//! builder and the chain reader encode calls identically.

pub mod constants;
pub mod interfaces;
