use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, Bytes, U256};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use opflow::{
    Collaborators, FlowContext, FlowEvent, FlowOutcome, Intent, Orchestrator, Spender,
    StaticConfig, WalletRef,
};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run one delegated-key flow against a relay/bundler and record the outcome in a deployments
/// JSON file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Static configuration (endpoints, contract addresses, thresholds, gas, polling).
    #[arg(long, default_value = "opflow.json")]
    config: PathBuf,

    /// Chain JSON-RPC endpoint; overrides `endpoints.chain_rpc`.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Relay base URL; overrides `endpoints.relay`.
    #[arg(long, env = "RELAY_URL")]
    relay_url: Option<String>,

    /// Backend base URL; overrides `endpoints.backend`.
    #[arg(long, env = "BACKEND_URL")]
    backend_url: Option<String>,

    /// Account that owns the wallet, as known to the backend.
    #[arg(long, env = "OWNER_ACCOUNT_ID")]
    owner: String,

    /// Wallet identifier, as known to the backend.
    #[arg(long, env = "WALLET_ID")]
    wallet_id: String,

    /// Wallet address. Taken from the delegated key when omitted.
    #[arg(long, env = "WALLET_ADDRESS")]
    wallet: Option<Address>,

    /// Hex init code, used only if the wallet has no code yet.
    #[arg(long)]
    init_code: Option<String>,

    /// Path to write deployment info (eg, deployments.devnet.json).
    #[arg(long, default_value = "deployments.devnet.json")]
    deployments_path: PathBuf,

    /// Optional network name (eg, devnet, sepolia).
    #[arg(long, default_value = "devnet")]
    network: String,

    /// Log filter directive.
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the precondition gate for an intent and print the report.
    Check {
        #[command(subcommand)]
        intent: IntentArgs,
    },
    /// Approve a spender for the base token.
    Approve {
        /// primary-factory, fee-sponsor or target-contract(0x...).
        #[arg(long)]
        spender: Spender,
        /// Amount in whole token units.
        #[arg(long)]
        amount: u64,
    },
    DeployElection {
        #[arg(long)]
        name: String,
        /// Seconds.
        #[arg(long)]
        duration: u64,
        #[arg(long, default_value = "")]
        description: String,
    },
    DeploySession {
        #[arg(long)]
        election: Address,
        /// Seconds.
        #[arg(long)]
        duration: u64,
        #[arg(long)]
        max_voters: u64,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum IntentArgs {
    DeployElection {
        #[arg(long, default_value = "check")]
        name: String,
    },
    DeploySession {
        #[arg(long)]
        election: Address,
    },
    Approve {
        #[arg(long)]
        spender: Spender,
    },
}

impl IntentArgs {
    fn into_intent(self) -> Intent {
        match self {
            IntentArgs::DeployElection { name } => Intent::DeployElection {
                name,
                duration: 1,
                description: String::new(),
            },
            IntentArgs::DeploySession { election } => Intent::DeploySession {
                election_contract: election,
                duration: 1,
                max_voters: 1,
                name: "check".to_string(),
            },
            IntentArgs::Approve { spender } => Intent::Approve {
                spender,
                amount: U256::ZERO,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let config = load_config(&cli)?;
    let collaborators = Collaborators::http(&config).context("failed building HTTP clients")?;
    let thresholds = config.thresholds;
    let orchestrator = Orchestrator::new(
        FlowContext {
            owner_account_id: cli.owner.clone(),
            wallet_id: cli.wallet_id.clone(),
            config,
        },
        collaborators,
    );

    let wallet = match cli.wallet {
        Some(wallet) => wallet,
        None => orchestrator
            .resolve_wallet()
            .await
            .context("failed resolving wallet from delegated key")?,
    };

    let intent = match &cli.command {
        Command::Check { intent } => {
            let report = orchestrator
                .check(&intent.clone().into_intent(), wallet)
                .await
                .context("precondition check failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("{}", report.summary());
            return Ok(());
        }
        Command::Approve { spender, amount } => Intent::Approve {
            spender: *spender,
            amount: thresholds.units(*amount),
        },
        Command::DeployElection {
            name,
            duration,
            description,
        } => Intent::DeployElection {
            name: name.clone(),
            duration: *duration,
            description: description.clone(),
        },
        Command::DeploySession {
            election,
            duration,
            max_voters,
            name,
        } => Intent::DeploySession {
            election_contract: *election,
            duration: *duration,
            max_voters: *max_voters,
            name: name.clone(),
        },
    };

    let init_code = cli
        .init_code
        .as_deref()
        .map(|raw| raw.parse::<Bytes>())
        .transpose()
        .context("--init-code is not valid hex")?;
    let kind = intent.kind();
    let mut handle = orchestrator.flow(intent, WalletRef { address: wallet, init_code });
    let mut events = handle
        .events()
        .ok_or_else(|| anyhow!("event stream already taken"))?;
    handle.start();

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(FlowEvent::Finished(outcome)) => break outcome,
                Some(event) => log_event(&event),
                None => break handle.outcome().await,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; cancelling flow");
                handle.cancel();
                break handle.outcome().await;
            }
        }
    };

    write_deployments_json(&cli, &kind.to_string(), wallet, &outcome)?;
    match outcome {
        FlowOutcome::Succeeded { receipt, tx_hash } => {
            println!(
                "{kind} confirmed (relay id {}, tx {})",
                receipt.relay_id,
                tx_hash.as_deref().unwrap_or("unknown")
            );
            Ok(())
        }
        FlowOutcome::StillPending { receipt, attempts } => {
            println!(
                "{kind} still pending after {attempts} status checks (relay id {})",
                receipt.relay_id
            );
            Ok(())
        }
        FlowOutcome::Failed(err) => bail!("{kind} failed: {err}"),
        FlowOutcome::Cancelled => bail!("{kind} cancelled"),
    }
}

fn load_config(cli: &Cli) -> Result<StaticConfig> {
    let mut config = StaticConfig::from_json_file(&cli.config)
        .with_context(|| format!("failed loading {}", cli.config.display()))?;
    if let Some(url) = &cli.rpc_url {
        config.endpoints.chain_rpc = url.clone();
    }
    if let Some(url) = &cli.relay_url {
        config.endpoints.relay = url.clone();
    }
    if let Some(url) = &cli.backend_url {
        config.endpoints.backend = url.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn log_event(event: &FlowEvent) {
    match event {
        FlowEvent::StatusChanged(status) => info!(%status, "status"),
        FlowEvent::RequirementsEvaluated(report) => {
            info!(passed = report.passed(), summary = %report.summary(), "requirements")
        }
        FlowEvent::ApprovalSubmitted { spender, relay_id } => {
            info!(%spender, %relay_id, "approval submitted")
        }
        FlowEvent::Submitted(receipt) => info!(
            relay_id = %receipt.relay_id,
            local_hash = %receipt.local_hash,
            "submitted"
        ),
        FlowEvent::HashesLinked(link) => {
            info!(local_hash = %link.local_hash, relay_hash = %link.relay_hash, "hashes linked")
        }
        FlowEvent::PollAttempt { attempt, status } => match status {
            Some(status) => info!(attempt, %status, "status check"),
            None => warn!(attempt, "status check failed"),
        },
        FlowEvent::Finished(outcome) => info!(outcome = outcome.label(), "finished"),
    }
}

fn write_deployments_json(
    cli: &Cli,
    entry_key: &str,
    wallet: Address,
    outcome: &FlowOutcome,
) -> Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    let existing = if cli.deployments_path.exists() {
        fs::read_to_string(&cli.deployments_path)
            .with_context(|| format!("failed reading {}", cli.deployments_path.display()))?
    } else {
        String::new()
    };

    let mut root: Value = if existing.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&existing)
            .with_context(|| format!("failed parsing JSON in {}", cli.deployments_path.display()))?
    };
    if !root.is_object() {
        root = json!({});
    }

    root["network"] = json!(cli.network);
    root["updated_at"] = json!(now);
    if root.get("deployments").and_then(Value::as_object).is_none() {
        root["deployments"] = json!({});
    }

    let mut entry = json!({
        "status": outcome.label(),
        "wallet": wallet,
        "recorded_at": now,
    });
    if let Some(receipt) = outcome.receipt() {
        entry["relay_id"] = json!(receipt.relay_id);
        entry["local_hash"] = json!(receipt.local_hash);
    }
    match outcome {
        FlowOutcome::Succeeded {
            tx_hash: Some(tx), ..
        } => entry["tx_hash"] = json!(tx),
        FlowOutcome::Failed(err) => entry["error"] = json!(err.to_string()),
        _ => {}
    }

    root["deployments"][entry_key] = entry;
    write_json_atomic(&cli.deployments_path, &root)
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised =
        serde_json::to_string_pretty(value).context("failed serialising deployments JSON")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
