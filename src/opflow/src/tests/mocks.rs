//! In-memory collaborators for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use opflow_types::{HashLink, Operation, RelayStatus};
use time::OffsetDateTime;

use crate::{
    account::interfaces::user_operation,
    backend::{IssuedKey, KeyIssuer, SyncCollaborator, SyncTarget},
    chain::{ChainReader, GasFees},
    clock::{Clock, ManualClock},
    config::{ContractAddresses, Endpoints, StaticConfig},
    errors::{ChainError, RelayError},
    relay::{LinkResponse, RelayApi, StatusResponse, SubmitRequest, SubmitResponse},
    utils::crypto::keccak256_bytes,
};

pub const OWNER: &str = "owner-1";
pub const WALLET_ID: &str = "wallet-1";
/// Secret key 0x...01.
pub const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
/// Secret key 0x...02.
pub const KEY_TWO: &str = "0x0000000000000000000000000000000000000000000000000000000000000002";

pub fn wallet() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn election() -> Address {
    Address::repeat_byte(0xee)
}

pub fn start_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

pub fn test_config() -> StaticConfig {
    StaticConfig {
        endpoints: Endpoints {
            chain_rpc: "http://127.0.0.1:8545".to_string(),
            relay: "http://127.0.0.1:9000".to_string(),
            backend: "http://127.0.0.1:9001".to_string(),
        },
        contracts: ContractAddresses {
            entry_point: Address::repeat_byte(0x01),
            election_factory: Address::repeat_byte(0x02),
            session_factory: Address::repeat_byte(0x03),
            fee_sponsor: Address::repeat_byte(0x04),
            base_token: Address::repeat_byte(0x05),
        },
        thresholds: Default::default(),
        gas: Default::default(),
        polling: Default::default(),
        key_store: Default::default(),
        approvals: Default::default(),
    }
}

/// Whole token units at 18 decimals.
pub fn tokens(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub struct MockChain {
    balance: Mutex<Result<U256, ChainError>>,
    allowances: Mutex<HashMap<Address, Result<U256, ChainError>>>,
    entry_point_nonce: Mutex<Result<U256, ChainError>>,
    wallet_nonce: Mutex<Result<U256, ChainError>>,
    code_size: Mutex<usize>,
    hash_override: Mutex<Option<B256>>,
    read_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            balance: Mutex::new(Ok(U256::ZERO)),
            allowances: Mutex::new(HashMap::new()),
            entry_point_nonce: Mutex::new(Ok(U256::from(7u64))),
            wallet_nonce: Mutex::new(Err(ChainError::Reverted("getNonce not supported".into()))),
            code_size: Mutex::new(100),
            hash_override: Mutex::new(None),
            read_delay: Mutex::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set_balance(&self, balance: Result<U256, ChainError>) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn set_allowance(&self, spender: Address, allowance: Result<U256, ChainError>) {
        self.allowances.lock().unwrap().insert(spender, allowance);
    }

    pub fn set_entry_point_nonce(&self, nonce: Result<U256, ChainError>) {
        *self.entry_point_nonce.lock().unwrap() = nonce;
    }

    pub fn set_wallet_nonce(&self, nonce: Result<U256, ChainError>) {
        *self.wallet_nonce.lock().unwrap() = nonce;
    }

    pub fn set_code_size(&self, size: usize) {
        *self.code_size.lock().unwrap() = size;
    }

    pub fn set_hash_override(&self, hash: Option<B256>) {
        *self.hash_override.lock().unwrap() = hash;
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
        self.delay().await;
        self.balance.lock().unwrap().clone()
    }

    async fn allowance(
        &self,
        _token: Address,
        _owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        self.delay().await;
        self.allowances
            .lock()
            .unwrap()
            .get(&spender)
            .cloned()
            .unwrap_or(Ok(U256::ZERO))
    }

    async fn entry_point_nonce(
        &self,
        _entry_point: Address,
        _sender: Address,
    ) -> Result<U256, ChainError> {
        self.entry_point_nonce.lock().unwrap().clone()
    }

    async fn wallet_nonce(&self, _wallet: Address) -> Result<U256, ChainError> {
        self.wallet_nonce.lock().unwrap().clone()
    }

    async fn user_op_hash(
        &self,
        entry_point: Address,
        operation: &Operation,
    ) -> Result<B256, ChainError> {
        if let Some(hash) = *self.hash_override.lock().unwrap() {
            return Ok(hash);
        }
        let mut encoded = user_operation(operation).abi_encode();
        encoded.extend_from_slice(entry_point.as_slice());
        Ok(keccak256_bytes(&encoded))
    }

    async fn code_size(&self, _address: Address) -> Result<usize, ChainError> {
        Ok(*self.code_size.lock().unwrap())
    }

    async fn gas_fees(&self) -> Result<GasFees, ChainError> {
        Ok(GasFees {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        })
    }
}

/// How the relay names accepted operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayIds {
    /// Echo the submitted `userOpHash`.
    Echo,
    /// Assign its own id, distinct from the local hash.
    Diverge,
}

pub fn relay_id_for(local_hash: B256) -> B256 {
    keccak256_bytes(local_hash.as_slice())
}

pub fn status(status: RelayStatus) -> StatusResponse {
    StatusResponse {
        status,
        tx_hash: None,
        message: None,
    }
}

type SubmitHook = Box<dyn Fn(&SubmitRequest) + Send + Sync>;

pub struct MockRelay {
    ids: Mutex<RelayIds>,
    on_submit: Mutex<Option<SubmitHook>>,
    submit_script: Mutex<VecDeque<Result<SubmitResponse, RelayError>>>,
    submitted: Mutex<Vec<SubmitRequest>>,
    status_scripts: Mutex<HashMap<B256, VecDeque<Result<StatusResponse, RelayError>>>>,
    fallback: Mutex<Result<StatusResponse, RelayError>>,
    checked: Mutex<Vec<B256>>,
    links: Mutex<Vec<HashLink>>,
    link_ok: Mutex<bool>,
}

impl MockRelay {
    pub fn new(ids: RelayIds) -> Self {
        Self {
            ids: Mutex::new(ids),
            on_submit: Mutex::new(None),
            submit_script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            status_scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(Ok(status(RelayStatus::Success))),
            checked: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            link_ok: Mutex::new(true),
        }
    }

    /// Runs for every submitted request, e.g. to make an approval land on the mock chain.
    pub fn on_submit(&self, hook: impl Fn(&SubmitRequest) + Send + Sync + 'static) {
        *self.on_submit.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn push_submit(&self, response: Result<SubmitResponse, RelayError>) {
        self.submit_script.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, id: B256, response: Result<StatusResponse, RelayError>) {
        self.status_scripts
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(response);
    }

    /// Answer for ids whose script is empty.
    pub fn set_fallback(&self, response: Result<StatusResponse, RelayError>) {
        *self.fallback.lock().unwrap() = response;
    }

    pub fn set_link_ok(&self, ok: bool) {
        *self.link_ok.lock().unwrap() = ok;
    }

    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn checked(&self) -> Vec<B256> {
        self.checked.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<HashLink> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, RelayError> {
        self.submitted.lock().unwrap().push(request.clone());
        if let Some(hook) = self.on_submit.lock().unwrap().as_ref() {
            hook(request);
        }
        if let Some(scripted) = self.submit_script.lock().unwrap().pop_front() {
            return scripted;
        }
        let response = match *self.ids.lock().unwrap() {
            RelayIds::Echo => SubmitResponse {
                user_op_hash: Some(request.user_op_hash.to_string()),
                ..SubmitResponse::default()
            },
            RelayIds::Diverge => SubmitResponse {
                relay_id: Some(relay_id_for(request.user_op_hash).to_string()),
                user_op_hash: Some(request.user_op_hash.to_string()),
                ..SubmitResponse::default()
            },
        };
        Ok(response)
    }

    async fn check_status(&self, id: B256) -> Result<StatusResponse, RelayError> {
        self.checked.lock().unwrap().push(id);
        let scripted = self
            .status_scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|script| script.pop_front());
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    async fn link_hashes(&self, link: &HashLink) -> Result<LinkResponse, RelayError> {
        self.links.lock().unwrap().push(*link);
        Ok(LinkResponse {
            success: *self.link_ok.lock().unwrap(),
            message: None,
        })
    }
}

pub struct MockIssuer {
    clock: Arc<dyn Clock>,
    secret: Mutex<String>,
    lifetime: Mutex<time::Duration>,
    wallet: Option<Address>,
    issue_failures: Mutex<VecDeque<RelayError>>,
    create_failure: Mutex<Option<RelayError>>,
    issue_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl MockIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            secret: Mutex::new(KEY_ONE.to_string()),
            lifetime: Mutex::new(time::Duration::hours(1)),
            wallet: Some(wallet()),
            issue_failures: Mutex::new(VecDeque::new()),
            create_failure: Mutex::new(None),
            issue_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_wallet(mut self) -> Self {
        self.wallet = None;
        self
    }

    pub fn set_secret(&self, secret: &str) {
        *self.secret.lock().unwrap() = secret.to_string();
    }

    pub fn set_lifetime(&self, lifetime: time::Duration) {
        *self.lifetime.lock().unwrap() = lifetime;
    }

    pub fn fail_next_issue(&self, err: RelayError) {
        self.issue_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_create(&self, err: RelayError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyIssuer for MockIssuer {
    async fn issue(&self, _owner: &str, _wallet_id: &str) -> Result<IssuedKey, RelayError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.issue_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(IssuedKey {
            private_key: self.secret.lock().unwrap().clone(),
            expires_at: self.clock.now() + *self.lifetime.lock().unwrap(),
            wallet_address: self.wallet,
        })
    }

    async fn create(&self, _owner: &str, _wallet_id: &str) -> Result<(), RelayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.create_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MockSync {
    calls: Mutex<Vec<SyncTarget>>,
}

impl MockSync {
    pub fn calls(&self) -> Vec<SyncTarget> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncCollaborator for MockSync {
    async fn reconcile(&self, target: &SyncTarget) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(target.clone());
        Ok(())
    }
}
