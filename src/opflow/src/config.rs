//! Static configuration consumed by the orchestrator.
//!
//! Loaded from a JSON file. Everything except endpoints and contract addresses has a default.

use std::{fs, path::Path, time::Duration};

use alloy_primitives::{Address, U256};
use opflow_types::Spender;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub endpoints: Endpoints,
    pub contracts: ContractAddresses,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub key_store: KeyStoreConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// JSON-RPC endpoint for chain reads.
    pub chain_rpc: String,
    /// Relay/bundler base URL (`submit`, `check-status`, `link-hashes`).
    pub relay: String,
    /// Backend base URL (delegated keys + status synchronisation).
    pub backend: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub entry_point: Address,
    pub election_factory: Address,
    pub session_factory: Address,
    /// Token paymaster that sponsors gas in exchange for the base token.
    pub fee_sponsor: Address,
    pub base_token: Address,
}

impl ContractAddresses {
    pub fn spender_address(&self, spender: &Spender) -> Address {
        match spender {
            Spender::PrimaryFactory => self.election_factory,
            Spender::FeeSponsor => self.fee_sponsor,
            Spender::TargetContract(addr) => *addr,
        }
    }
}

/// Minimums in whole token units, scaled by `token_decimals`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub token_decimals: u8,
    pub base_balance: u64,
    pub primary_factory: u64,
    pub fee_sponsor: u64,
    /// Allowance an election contract needs when it is approved directly.
    pub election_target: u64,
    /// Allowance an election contract needs to charge voting fees for a session.
    pub voting_fee_target: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            token_decimals: 18,
            base_balance: 5,
            primary_factory: 4,
            fee_sponsor: 1,
            election_target: 3,
            voting_fee_target: 20,
        }
    }
}

impl Thresholds {
    /// Convert whole token units into base units.
    pub fn units(&self, amount: u64) -> U256 {
        U256::from(amount) * U256::from(10u64).pow(U256::from(self.token_decimals))
    }

    pub fn balance_minimum(&self) -> U256 {
        self.units(self.base_balance)
    }
}

/// Fixed gas parameters for one intent family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimits {
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
    pub pre_verification_gas: u64,
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Fixed values for election/session deployment, set well above observed usage.
    pub deployment: GasLimits,
    pub approval_call_gas_limit: u64,
    /// Self-funded value; doubled when the fee sponsor pays.
    pub approval_verification_gas_limit: u64,
    pub approval_pre_verification_gas: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            deployment: GasLimits {
                call_gas_limit: 3_000_000,
                verification_gas_limit: 1_500_000,
                pre_verification_gas: 150_000,
                max_fee_per_gas: 60_000_000_000,
                max_priority_fee_per_gas: 2_000_000_000,
            },
            approval_call_gas_limit: 120_000,
            approval_verification_gas_limit: 150_000,
            approval_pre_verification_gas: 60_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 4_000,
            max_attempts: 15,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// A newly issued key expiring within this window is rejected. Cached keys are kept until expiry.
    pub expiry_margin_secs: u64,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            expiry_margin_secs: 30,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Approve `threshold * multiplier` so a single approval covers several operations.
    pub amount_multiplier: u64,
    /// Gate re-evaluations after approving before giving up.
    pub max_rounds: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            amount_multiplier: 10,
            max_rounds: 2,
        }
    }
}

impl StaticConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: StaticConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("endpoints.chain_rpc", &self.endpoints.chain_rpc),
            ("endpoints.relay", &self.endpoints.relay),
            ("endpoints.backend", &self.endpoints.backend),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("{name} `{url}`: {e}")))?;
        }

        let c = &self.contracts;
        for (name, addr) in [
            ("contracts.entry_point", c.entry_point),
            ("contracts.election_factory", c.election_factory),
            ("contracts.session_factory", c.session_factory),
            ("contracts.fee_sponsor", c.fee_sponsor),
            ("contracts.base_token", c.base_token),
        ] {
            if addr == Address::ZERO {
                return Err(ConfigError::Invalid(format!("{name} is the zero address")));
            }
        }

        if self.polling.interval_ms == 0 || self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "polling interval and attempt budget must be non-zero".to_string(),
            ));
        }
        if self.approvals.amount_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "approvals.amount_multiplier must be non-zero".to_string(),
            ));
        }
        if self.thresholds.token_decimals > 36 {
            return Err(ConfigError::Invalid(format!(
                "thresholds.token_decimals {} is out of range",
                self.thresholds.token_decimals
            )));
        }
        Ok(())
    }
}
