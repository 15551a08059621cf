//! Constants mirrored from the entry point / wallet contracts.

use alloy_primitives::{aliases::U192, U256};

/// Nonce key used for every operation (sequential nonces, single lane).
pub const NONCE_KEY: U192 = U192::ZERO;

/// Native value forwarded by `execute`; intents never move ETH.
pub const EXECUTE_VALUE: U256 = U256::ZERO;

/// Recovery byte offset for Ethereum-style signatures (v = recid + 27).
pub const SIGNATURE_V_OFFSET: u8 = 27;

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;
