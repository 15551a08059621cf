//! Operation builder.
//!
//! Turns one [`Intent`] into an unsigned [`Operation`]: resolves the nonce, encodes the intent
//! call inside the wallet's `execute` envelope and fills gas and fee-sponsor fields.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use opflow_types::{Intent, Operation};
use rand::Rng;
use tracing::debug;

use crate::{
    account::{
        constants::EXECUTE_VALUE,
        interfaces::{IElectionFactory, IERC20, ISessionFactory, ISmartWallet},
    },
    chain::ChainReader,
    clock::Clock,
    config::{ContractAddresses, GasConfig, StaticConfig},
    errors::{BuildError, NonceError},
};

/// The smart-contract wallet an operation is sent from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletRef {
    pub address: Address,
    /// Deployment code, used only while the wallet has no code on chain.
    pub init_code: Option<Bytes>,
}

impl WalletRef {
    pub fn deployed(address: Address) -> Self {
        Self {
            address,
            init_code: None,
        }
    }
}

/// `{unix_ts}-{random}` appended to human-readable fields so repeated deployments never collide.
pub fn unique_suffix(unix_ts: i64) -> String {
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{unix_ts}-{nonce:06}")
}

pub fn with_unique_suffix(field: &str, suffix: &str) -> String {
    format!("{field}-{suffix}")
}

pub struct OperationBuilder {
    chain: Arc<dyn ChainReader>,
    clock: Arc<dyn Clock>,
    contracts: ContractAddresses,
    gas: GasConfig,
}

impl OperationBuilder {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn Clock>,
        contracts: ContractAddresses,
        gas: GasConfig,
    ) -> Self {
        Self {
            chain,
            clock,
            contracts,
            gas,
        }
    }

    pub fn from_config(
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn Clock>,
        config: &StaticConfig,
    ) -> Self {
        Self::new(chain, clock, config.contracts, config.gas)
    }

    pub async fn build(&self, intent: &Intent, wallet: &WalletRef) -> Result<Operation, BuildError> {
        let nonce = self.resolve_nonce(wallet.address).await?;
        let init_code = self.init_code(wallet).await?;
        let call_data = self.call_data(intent);

        let mut op = Operation {
            sender: wallet.address,
            nonce,
            init_code,
            call_data,
            ..Operation::default()
        };
        if intent.uses_fee_sponsor() {
            op.paymaster_and_data = Bytes::copy_from_slice(self.contracts.fee_sponsor.as_slice());
        }
        self.fill_gas(intent, &mut op).await?;

        debug!(
            kind = %intent.kind(),
            sender = %op.sender,
            nonce = %op.nonce,
            sponsored = op.is_sponsored(),
            "operation built"
        );
        Ok(op)
    }

    /// `EntryPoint.getNonce(sender, 0)`, falling back to the wallet's own `getNonce()` only when
    /// the entry point does not support the call.
    pub async fn resolve_nonce(&self, sender: Address) -> Result<U256, NonceError> {
        match self
            .chain
            .entry_point_nonce(self.contracts.entry_point, sender)
            .await
        {
            Ok(nonce) => Ok(nonce),
            Err(entry_point) if entry_point.is_unsupported_call() => {
                debug!(%sender, error = %entry_point, "entry point nonce unsupported; asking the wallet");
                self.chain.wallet_nonce(sender).await.map_err(|wallet| NonceError {
                    entry_point,
                    wallet: Some(wallet),
                })
            }
            Err(entry_point) => Err(NonceError {
                entry_point,
                wallet: None,
            }),
        }
    }

    async fn init_code(&self, wallet: &WalletRef) -> Result<Bytes, BuildError> {
        let Some(init_code) = wallet.init_code.as_ref().filter(|code| !code.is_empty()) else {
            return Ok(Bytes::new());
        };
        let size = self
            .chain
            .code_size(wallet.address)
            .await
            .map_err(BuildError::Chain)?;
        Ok(if size == 0 {
            init_code.clone()
        } else {
            Bytes::new()
        })
    }

    /// Intent call wrapped in `execute(target, 0, data)`.
    fn call_data(&self, intent: &Intent) -> Bytes {
        let suffix = if intent.is_name_bearing() {
            unique_suffix(self.clock.now().unix_timestamp())
        } else {
            String::new()
        };
        let (target, inner) = match intent {
            Intent::Approve { spender, amount } => (
                self.contracts.base_token,
                IERC20::approveCall {
                    spender: self.contracts.spender_address(spender),
                    amount: *amount,
                }
                .abi_encode(),
            ),
            Intent::DeployElection {
                name,
                duration,
                description,
            } => (
                self.contracts.election_factory,
                IElectionFactory::createElectionCall {
                    name: with_unique_suffix(name, &suffix),
                    duration: U256::from(*duration),
                    description: with_unique_suffix(description, &suffix),
                }
                .abi_encode(),
            ),
            Intent::DeploySession {
                election_contract,
                duration,
                max_voters,
                name,
            } => (
                self.contracts.session_factory,
                ISessionFactory::createSessionCall {
                    election: *election_contract,
                    duration: U256::from(*duration),
                    maxVoters: U256::from(*max_voters),
                    name: with_unique_suffix(name, &suffix),
                }
                .abi_encode(),
            ),
        };

        ISmartWallet::executeCall {
            dest: target,
            value: EXECUTE_VALUE,
            func: inner.into(),
        }
        .abi_encode()
        .into()
    }

    async fn fill_gas(&self, intent: &Intent, op: &mut Operation) -> Result<(), BuildError> {
        match intent {
            Intent::Approve { .. } => {
                let fees = self.chain.gas_fees().await.map_err(BuildError::Chain)?;
                let mut verification = self.gas.approval_verification_gas_limit;
                if op.is_sponsored() {
                    verification = verification.saturating_mul(2);
                }
                op.call_gas_limit = U256::from(self.gas.approval_call_gas_limit);
                op.verification_gas_limit = U256::from(verification);
                op.pre_verification_gas = U256::from(self.gas.approval_pre_verification_gas);
                op.max_fee_per_gas = fees.max_fee_per_gas;
                op.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
            }
            Intent::DeployElection { .. } | Intent::DeploySession { .. } => {
                let limits = self.gas.deployment;
                op.call_gas_limit = U256::from(limits.call_gas_limit);
                op.verification_gas_limit = U256::from(limits.verification_gas_limit);
                op.pre_verification_gas = U256::from(limits.pre_verification_gas);
                op.max_fee_per_gas = U256::from(limits.max_fee_per_gas);
                op.max_priority_fee_per_gas = U256::from(limits.max_priority_fee_per_gas);
            }
        }
        Ok(())
    }
}
