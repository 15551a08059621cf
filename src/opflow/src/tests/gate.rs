use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use opflow_types::{Intent, Spender};

use super::mocks::*;
use crate::{
    errors::{ChainError, PreconditionError},
    gate::{PreconditionGate, Requirements},
};

fn election_intent() -> Intent {
    Intent::DeployElection {
        name: "Board".into(),
        duration: 86_400,
        description: "Annual board vote".into(),
    }
}

fn setup() -> (Arc<MockChain>, PreconditionGate, Requirements) {
    let config = test_config();
    let chain = Arc::new(MockChain::new());
    let gate = PreconditionGate::from_config(chain.clone(), &config);
    let requirements = Requirements::for_intent(&election_intent(), &config.thresholds);
    (chain, gate, requirements)
}

#[test]
fn test_requirements_per_intent() {
    let thresholds = test_config().thresholds;

    let deploy_election = Requirements::for_intent(&election_intent(), &thresholds);
    let required: Vec<_> = deploy_election.required_spenders().map(|r| r.spender).collect();
    assert_eq!(required, vec![Spender::PrimaryFactory, Spender::FeeSponsor]);
    assert_eq!(deploy_election.balance_minimum, tokens(5));
    assert_eq!(deploy_election.minimum_for(&Spender::PrimaryFactory), Some(tokens(4)));
    assert_eq!(deploy_election.minimum_for(&Spender::FeeSponsor), Some(tokens(1)));

    let session = Requirements::for_intent(
        &Intent::DeploySession {
            election_contract: election(),
            duration: 3_600,
            max_voters: 50,
            name: "Round 1".into(),
        },
        &thresholds,
    );
    let required: Vec<_> = session.required_spenders().map(|r| r.spender).collect();
    assert_eq!(
        required,
        vec![Spender::FeeSponsor, Spender::TargetContract(election())]
    );
    assert_eq!(
        session.minimum_for(&Spender::TargetContract(election())),
        Some(tokens(20))
    );

    let approve_sponsor = Requirements::for_intent(
        &Intent::Approve {
            spender: Spender::FeeSponsor,
            amount: tokens(10),
        },
        &thresholds,
    );
    assert_eq!(approve_sponsor.required_spenders().count(), 0);

    let approve_target = Requirements::for_intent(
        &Intent::Approve {
            spender: Spender::TargetContract(election()),
            amount: tokens(30),
        },
        &thresholds,
    );
    assert_eq!(
        approve_target.minimum_for(&Spender::TargetContract(election())),
        Some(tokens(3))
    );
}

#[tokio::test]
async fn test_scenario_no_balance_offers_no_approvals() {
    let (_chain, gate, requirements) = setup();

    let report = gate.evaluate(wallet(), &requirements).await.unwrap();
    assert!(!report.has_balance);
    assert!(!report.passed());
    assert!(report.missing_approvals().is_empty());
    assert!(report.summary().contains("base token balance"));
}

#[tokio::test]
async fn test_scenario_only_sponsor_missing() {
    let config = test_config();
    let (chain, gate, requirements) = setup();
    chain.set_balance(Ok(tokens(6)));
    chain.set_allowance(config.contracts.election_factory, Ok(tokens(5)));

    let report = gate.evaluate(wallet(), &requirements).await.unwrap();
    assert!(report.has_balance);
    assert!(!report.passed());
    assert_eq!(report.has_allowance.get(&Spender::PrimaryFactory), Some(&true));
    assert_eq!(report.has_allowance.get(&Spender::FeeSponsor), Some(&false));
    assert_eq!(report.missing_approvals(), vec![Spender::FeeSponsor]);
    assert_eq!(report.snapshot.allowance(&Spender::PrimaryFactory), tokens(5));
}

#[tokio::test]
async fn test_flipping_any_threshold_flips_result() {
    let config = test_config();
    let contracts = config.contracts;
    let (chain, gate, requirements) = setup();

    let passing = || {
        chain.set_balance(Ok(tokens(5)));
        chain.set_allowance(contracts.election_factory, Ok(tokens(4)));
        chain.set_allowance(contracts.fee_sponsor, Ok(tokens(1)));
    };

    passing();
    assert!(gate.evaluate(wallet(), &requirements).await.unwrap().passed());

    let just_below = |n: u64| tokens(n) - U256::from(1u64);

    chain.set_balance(Ok(just_below(5)));
    assert!(!gate.evaluate(wallet(), &requirements).await.unwrap().passed());
    passing();

    chain.set_allowance(contracts.election_factory, Ok(just_below(4)));
    assert!(!gate.evaluate(wallet(), &requirements).await.unwrap().passed());
    passing();

    chain.set_allowance(contracts.fee_sponsor, Ok(just_below(1)));
    assert!(!gate.evaluate(wallet(), &requirements).await.unwrap().passed());
    passing();

    assert!(gate.evaluate(wallet(), &requirements).await.unwrap().passed());
}

#[tokio::test]
async fn test_optional_read_failure_degrades_to_zero() {
    let config = test_config();
    let chain = Arc::new(MockChain::new());
    let gate = PreconditionGate::from_config(chain.clone(), &config);
    let requirements = Requirements::for_intent(
        &Intent::DeploySession {
            election_contract: election(),
            duration: 3_600,
            max_voters: 50,
            name: "Round 1".into(),
        },
        &config.thresholds,
    );
    chain.set_balance(Ok(tokens(5)));
    chain.set_allowance(config.contracts.fee_sponsor, Ok(tokens(1)));
    chain.set_allowance(election(), Ok(tokens(20)));
    chain.set_allowance(
        config.contracts.election_factory,
        Err(ChainError::Transport("timeout".into())),
    );

    let report = gate.evaluate(wallet(), &requirements).await.unwrap();
    assert!(report.passed());
    assert_eq!(report.snapshot.allowance(&Spender::PrimaryFactory), U256::ZERO);
    assert_eq!(report.has_allowance.get(&Spender::PrimaryFactory), Some(&false));
}

#[tokio::test]
async fn test_required_read_failure_is_fatal() {
    let config = test_config();
    let (chain, gate, requirements) = setup();
    chain.set_balance(Ok(tokens(5)));
    chain.set_allowance(
        config.contracts.fee_sponsor,
        Err(ChainError::Rpc {
            code: -32000,
            message: "header not found".into(),
        }),
    );

    let err = gate.evaluate(wallet(), &requirements).await.unwrap_err();
    assert!(matches!(
        err,
        PreconditionError::AllowanceRead {
            spender: Spender::FeeSponsor,
            ..
        }
    ));

    chain.set_balance(Err(ChainError::Transport("refused".into())));
    let err = gate.evaluate(wallet(), &requirements).await.unwrap_err();
    assert!(matches!(err, PreconditionError::BalanceRead(_)));
    assert!(!gate.is_evaluating(wallet()));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_evaluation_rejected_and_guard_released() {
    let (chain, gate, requirements) = setup();
    chain.set_read_delay(Some(Duration::from_secs(1)));

    let (first, second) = tokio::join!(
        gate.evaluate(wallet(), &requirements),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.evaluate(wallet(), &requirements).await
        }
    );
    assert!(first.is_ok());
    assert_eq!(
        second.unwrap_err(),
        PreconditionError::EvaluationInProgress(wallet())
    );
    assert!(!gate.is_evaluating(wallet()));

    // Another wallet is unaffected while one is in flight.
    let other = alloy_primitives::Address::repeat_byte(0xbb);
    let (a, b) = tokio::join!(
        gate.evaluate(wallet(), &requirements),
        gate.evaluate(other, &requirements)
    );
    assert!(a.is_ok() && b.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_guard_released_when_evaluation_dropped() {
    let (chain, gate, requirements) = setup();
    chain.set_read_delay(Some(Duration::from_secs(5)));

    let timed_out = tokio::time::timeout(
        Duration::from_secs(1),
        gate.evaluate(wallet(), &requirements),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(!gate.is_evaluating(wallet()));

    chain.set_read_delay(None);
    assert!(gate.evaluate(wallet(), &requirements).await.is_ok());
}

#[tokio::test]
async fn test_reads_issued_per_spender_every_time() {
    let (chain, gate, requirements) = setup();
    gate.evaluate(wallet(), &requirements).await.unwrap();
    gate.evaluate(wallet(), &requirements).await.unwrap();
    // One balance read plus two allowance reads per evaluation; nothing is cached.
    assert_eq!(chain.reads(), 6);
}
