//! Precondition gate.
//!
//! Reads the wallet's base-token balance and one allowance per spender, compares each against
//! its own minimum, and passes only when the balance and every *required* allowance clear their
//! thresholds. Snapshots are never cached across evaluations.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use opflow_types::{AllowanceSnapshot, Intent, Spender};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    chain::ChainReader,
    config::{ContractAddresses, StaticConfig, Thresholds},
    errors::PreconditionError,
};

/// One spender to read, its minimum allowance, and whether failing it blocks the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requirement {
    pub spender: Spender,
    pub minimum: U256,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirements {
    pub balance_minimum: U256,
    pub spenders: Vec<Requirement>,
}

impl Requirements {
    /// Spenders an intent depends on. Named spenders that are not required are still read
    /// (optional) so the UI can show their state.
    pub fn for_intent(intent: &Intent, thresholds: &Thresholds) -> Self {
        let factory = |required| Requirement {
            spender: Spender::PrimaryFactory,
            minimum: thresholds.units(thresholds.primary_factory),
            required,
        };
        let sponsor = |required| Requirement {
            spender: Spender::FeeSponsor,
            minimum: thresholds.units(thresholds.fee_sponsor),
            required,
        };

        let spenders = match intent {
            Intent::DeployElection { .. } => vec![factory(true), sponsor(true)],
            Intent::DeploySession {
                election_contract, ..
            } => vec![
                factory(false),
                sponsor(true),
                Requirement {
                    spender: Spender::TargetContract(*election_contract),
                    minimum: thresholds.units(thresholds.voting_fee_target),
                    required: true,
                },
            ],
            Intent::Approve { spender, .. } => {
                let mut spenders = vec![factory(false), sponsor(intent.uses_fee_sponsor())];
                if let Spender::TargetContract(addr) = spender {
                    spenders.push(Requirement {
                        spender: Spender::TargetContract(*addr),
                        minimum: thresholds.units(thresholds.election_target),
                        required: false,
                    });
                }
                spenders
            }
        };

        Self {
            balance_minimum: thresholds.balance_minimum(),
            spenders,
        }
    }

    pub fn required_spenders(&self) -> impl Iterator<Item = &Requirement> {
        self.spenders.iter().filter(|r| r.required)
    }

    pub fn minimum_for(&self, spender: &Spender) -> Option<U256> {
        self.spenders
            .iter()
            .find(|r| r.spender == *spender)
            .map(|r| r.minimum)
    }
}

/// Result of one gate evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub wallet: Address,
    pub snapshot: AllowanceSnapshot,
    pub has_balance: bool,
    pub has_allowance: BTreeMap<Spender, bool>,
    pub required: Vec<Spender>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.has_balance
            && self
                .required
                .iter()
                .all(|s| self.has_allowance.get(s).copied().unwrap_or(false))
    }

    /// Required spenders still below threshold. Empty while the balance itself is short, since
    /// approving cannot fix that.
    pub fn missing_approvals(&self) -> Vec<Spender> {
        if !self.has_balance {
            return Vec::new();
        }
        self.required
            .iter()
            .filter(|s| !self.has_allowance.get(s).copied().unwrap_or(false))
            .copied()
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.has_balance {
            parts.push(format!(
                "base token balance {} is below minimum",
                self.snapshot.base_token_balance
            ));
        }
        for spender in &self.required {
            if !self.has_allowance.get(spender).copied().unwrap_or(false) {
                parts.push(format!(
                    "{spender} allowance {} is below minimum",
                    self.snapshot.allowance(spender)
                ));
            }
        }
        if parts.is_empty() {
            "all requirements satisfied".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Holds the per-wallet evaluation slot; releases it on drop (success, error or cancellation).
struct EvaluationGuard<'a> {
    in_flight: &'a Mutex<HashSet<Address>>,
    wallet: Address,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.wallet);
    }
}

pub struct PreconditionGate {
    chain: Arc<dyn ChainReader>,
    contracts: ContractAddresses,
    in_flight: Mutex<HashSet<Address>>,
}

impl PreconditionGate {
    pub fn new(chain: Arc<dyn ChainReader>, contracts: ContractAddresses) -> Self {
        Self {
            chain,
            contracts,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(chain: Arc<dyn ChainReader>, config: &StaticConfig) -> Self {
        Self::new(chain, config.contracts)
    }

    fn enter(&self, wallet: Address) -> Result<EvaluationGuard<'_>, PreconditionError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(wallet) {
            return Err(PreconditionError::EvaluationInProgress(wallet));
        }
        Ok(EvaluationGuard {
            in_flight: &self.in_flight,
            wallet,
        })
    }

    pub fn is_evaluating(&self, wallet: Address) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&wallet)
    }

    pub async fn evaluate(
        &self,
        wallet: Address,
        requirements: &Requirements,
    ) -> Result<GateReport, PreconditionError> {
        let _guard = self.enter(wallet)?;
        let token = self.contracts.base_token;

        let reads = requirements.spenders.iter().map(|req| {
            let spender_addr = self.contracts.spender_address(&req.spender);
            async move { (req, self.chain.allowance(token, wallet, spender_addr).await) }
        });
        let (balance, allowances) =
            tokio::join!(self.chain.balance_of(token, wallet), join_all(reads));

        let balance = balance.map_err(PreconditionError::BalanceRead)?;

        let mut snapshot = AllowanceSnapshot {
            base_token_balance: balance,
            allowances: BTreeMap::new(),
        };
        let mut has_allowance = BTreeMap::new();
        for (req, read) in allowances {
            let allowance = match read {
                Ok(value) => value,
                Err(source) if req.required => {
                    return Err(PreconditionError::AllowanceRead {
                        spender: req.spender,
                        source,
                    });
                }
                Err(err) => {
                    warn!(%wallet, spender = %req.spender, error = %err, "optional allowance read failed; treating as zero");
                    U256::ZERO
                }
            };
            snapshot.allowances.insert(req.spender, allowance);
            has_allowance.insert(req.spender, allowance >= req.minimum);
        }

        let report = GateReport {
            wallet,
            has_balance: balance >= requirements.balance_minimum,
            snapshot,
            has_allowance,
            required: requirements.required_spenders().map(|r| r.spender).collect(),
        };
        debug!(%wallet, passed = report.passed(), summary = %report.summary(), "precondition gate evaluated");
        Ok(report)
    }
}
