use core::{fmt, str::FromStr};

use alloy_primitives::{Address, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Named allowance spenders the wallet may need to approve.
///
/// Serialised as its display string so it can key JSON maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Spender {
    /// The election factory that pulls creation fees.
    PrimaryFactory,
    /// The paymaster that charges the base token for sponsored gas.
    FeeSponsor,
    /// A specific contract (election or ballot manager) charging per-use fees.
    TargetContract(Address),
}

impl fmt::Display for Spender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spender::PrimaryFactory => f.write_str("primary-factory"),
            Spender::FeeSponsor => f.write_str("fee-sponsor"),
            Spender::TargetContract(addr) => write!(f, "target-contract({addr})"),
        }
    }
}

impl FromStr for Spender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary-factory" => Ok(Spender::PrimaryFactory),
            "fee-sponsor" => Ok(Spender::FeeSponsor),
            other => other
                .strip_prefix("target-contract(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| format!("unknown spender `{other}`"))?
                .parse::<Address>()
                .map(Spender::TargetContract)
                .map_err(|e| format!("invalid target contract in `{other}`: {e}")),
        }
    }
}

impl Serialize for Spender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Spender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// What a single operation is meant to do on behalf of the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "type")]
pub enum Intent {
    /// ERC-20 `approve(spender, amount)` on the base token.
    Approve { spender: Spender, amount: U256 },
    /// Create a new election through the election factory.
    DeployElection {
        name: String,
        duration: u64,
        description: String,
    },
    /// Open a voting session on an existing election contract.
    DeploySession {
        election_contract: Address,
        duration: u64,
        max_voters: u64,
        name: String,
    },
}

/// Discriminant of [`Intent`], used for gas tables and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    Approve,
    DeployElection,
    DeploySession,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Approve { .. } => IntentKind::Approve,
            Intent::DeployElection { .. } => IntentKind::DeployElection,
            Intent::DeploySession { .. } => IntentKind::DeploySession,
        }
    }

    /// Intents whose human-readable fields must be made unique before encoding.
    pub fn is_name_bearing(&self) -> bool {
        matches!(self, Intent::DeployElection { .. } | Intent::DeploySession { .. })
    }

    /// Whether gas for this intent may be paid by the fee sponsor.
    ///
    /// Approving the sponsor itself is always self-funded.
    pub fn uses_fee_sponsor(&self) -> bool {
        !matches!(
            self,
            Intent::Approve {
                spender: Spender::FeeSponsor,
                ..
            }
        )
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Approve => f.write_str("approve"),
            IntentKind::DeployElection => f.write_str("deploy-election"),
            IntentKind::DeploySession => f.write_str("deploy-session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spender_display_parses_back() {
        let target = Spender::TargetContract(Address::repeat_byte(0x11));
        for spender in [Spender::PrimaryFactory, Spender::FeeSponsor, target] {
            assert_eq!(spender.to_string().parse::<Spender>(), Ok(spender));
        }
        assert!("treasury".parse::<Spender>().is_err());
    }

    #[test]
    fn test_sponsor_approval_is_self_funded() {
        let own = Intent::Approve {
            spender: Spender::FeeSponsor,
            amount: U256::from(1u64),
        };
        let factory = Intent::Approve {
            spender: Spender::PrimaryFactory,
            amount: U256::from(1u64),
        };
        assert!(!own.uses_fee_sponsor());
        assert!(factory.uses_fee_sponsor());
        assert!(!factory.is_name_bearing());
    }
}
