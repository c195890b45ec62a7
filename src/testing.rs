//! Test doubles shared by the unit tests.

use alloy::primitives::{b256, keccak256, Address, B256, Bytes, Log as PrimitiveLog, LogData, TxHash, U256};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::chain::{ChainClient, ChainError};
use crate::coordinator::{CoordinatorCaller, IVORCoordinator};
use crate::fulfiller::Dispatcher;
use crate::identity::OracleIdentity;
use crate::storage::{
    CheckpointStore, RandomnessRequestRecord, RequestLedger, RequestStatus, StorageError,
};
use crate::transactor::Transactor;
use crate::vrf::{HmacProver, ProverError, VrfProver};

pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const COORDINATOR: Address = Address::new([0xC0; 20]);
pub const REQUEST_ID: B256 =
    b256!("beef000000000000000000000000000000000000000000000000000000000000");

pub fn dev_identity() -> OracleIdentity {
    OracleIdentity::from_private_key_hex(DEV_KEY).unwrap()
}

/// In-process chain: holds every coordinator log ever emitted and answers
/// filters by block number.
pub struct FakeChain {
    logs: Mutex<Vec<Log>>,
    filter_calls: Mutex<Vec<u64>>,
    /// Number of upcoming `filter_logs` calls that fail with a transport error.
    pub filter_failures: AtomicUsize,
    pub nonce: AtomicU64,
    pub fail_nonce: AtomicBool,
    pub reject_sends: AtomicBool,
    pub gas_price: u128,
    call_results: Mutex<HashMap<[u8; 4], Bytes>>,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
            filter_calls: Mutex::new(Vec::new()),
            filter_failures: AtomicUsize::new(0),
            nonce: AtomicU64::new(0),
            fail_nonce: AtomicBool::new(false),
            reject_sends: AtomicBool::new(false),
            gas_price: 1_000_000_000,
            call_results: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_call_result(&self, selector: [u8; 4], output: impl Into<Bytes>) {
        self.call_results.lock().unwrap().insert(selector, output.into());
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn filter_calls(&self) -> Vec<u64> {
        self.filter_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn filter_logs(&self, from_block: u64, address: Address) -> Result<Vec<Log>, ChainError> {
        self.filter_calls.lock().unwrap().push(from_block);
        let failures = self.filter_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.filter_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.inner.address == address)
            .filter(|log| log.block_number.is_none_or(|n| n >= from_block))
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|log| log.block_number)
            .max()
            .unwrap_or_default())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        if self.fail_nonce.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("timed out".into()));
        }
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn suggest_gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.gas_price)
    }

    async fn call(&self, _to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let selector: [u8; 4] = input
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::Rejected("missing selector".into()))?;
        self.call_results
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| ChainError::Rejected("execution reverted".into()))
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(ChainError::Rejected("nonce too low".into()));
        }
        let nonce = request.nonce.unwrap_or_default();
        self.nonce.fetch_max(nonce + 1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(request);
        Ok(keccak256(nonce.to_be_bytes()))
    }
}

#[derive(Default)]
struct MemoryState {
    checkpoint: u64,
    checkpoint_history: Vec<u64>,
    records: HashMap<B256, RandomnessRequestRecord>,
    order: Vec<B256>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    pub fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value ever passed to `set_checkpoint`, in order.
    pub fn checkpoint_history(&self) -> Vec<u64> {
        self.state.lock().unwrap().checkpoint_history.clone()
    }
}

impl CheckpointStore for MemoryStore {
    fn checkpoint(&self) -> Result<u64, StorageError> {
        Ok(self.state.lock().unwrap().checkpoint)
    }

    fn set_checkpoint(&self, next_block: u64) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.checkpoint = next_block;
        state.checkpoint_history.push(next_block);
        Ok(())
    }
}

impl RequestLedger for MemoryStore {
    fn insert(&self, record: &RandomnessRequestRecord) -> Result<(), StorageError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupt("requests"));
        }
        let mut state = self.state.lock().unwrap();
        if state.records.contains_key(&record.request_id) {
            return Err(StorageError::Duplicate(record.request_id));
        }
        state.records.insert(record.request_id, record.clone());
        state.order.push(record.request_id);
        Ok(())
    }

    fn get(&self, request_id: &B256) -> Result<Option<RandomnessRequestRecord>, StorageError> {
        Ok(self.state.lock().unwrap().records.get(request_id).cloned())
    }

    fn last(&self) -> Result<Option<RandomnessRequestRecord>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.order.last().and_then(|id| state.records.get(id)).cloned())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.state.lock().unwrap().records.len())
    }
}

pub struct FailingProver;

impl VrfProver for FailingProver {
    fn prove(&self, _: &[u8; 32], _: B256, _: u64) -> Result<Bytes, ProverError> {
        Err(ProverError("key not loaded".into()))
    }
}

/// Fake chain, in-memory store and a coordinator caller for the dev identity.
pub struct Harness {
    pub identity: OracleIdentity,
    pub chain: Arc<FakeChain>,
    pub store: Arc<MemoryStore>,
    pub caller: Arc<CoordinatorCaller>,
}

impl Harness {
    pub fn new() -> Self {
        let identity = dev_identity();
        let chain = Arc::new(FakeChain::new());
        let transactor = Arc::new(Transactor::new(
            chain.clone(),
            identity.address(),
            31337,
            1_000_000,
            None,
        ));
        let caller = Arc::new(CoordinatorCaller::new(
            COORDINATOR,
            chain.clone(),
            transactor,
            identity.proving_key(),
        ));
        Self {
            identity,
            chain,
            store: Arc::new(MemoryStore::new()),
            caller,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let prover = HmacProver::new(b"test-secret".to_vec(), self.identity.proving_key());
        Dispatcher::new(self.caller.clone(), Arc::new(prover), self.store.clone())
    }
}

pub fn sample_request(key_hash: B256) -> IVORCoordinator::RandomnessRequest {
    request_with_id(key_hash, REQUEST_ID)
}

pub fn request_with_id(key_hash: B256, request_id: B256) -> IVORCoordinator::RandomnessRequest {
    IVORCoordinator::RandomnessRequest {
        keyHash: key_hash,
        seed: U256::from(12345),
        sender: Address::repeat_byte(0x11),
        fee: U256::from(1),
        requestID: request_id,
    }
}

/// Wrap raw log data emitted by the coordinator at `(block, log_index)`.
pub fn log_at(data: LogData, block: u64, log_index: u64) -> Log {
    Log {
        inner: PrimitiveLog {
            address: COORDINATOR,
            data,
        },
        block_hash: Some(keccak256(block.to_be_bytes())),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(keccak256([block.to_be_bytes(), log_index.to_be_bytes()].concat())),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

pub fn request_log(event: &IVORCoordinator::RandomnessRequest, block: u64, log_index: u64) -> Log {
    log_at(event.encode_log_data(), block, log_index)
}

pub fn sample_record(id_byte: u8, block: u64) -> RandomnessRequestRecord {
    RandomnessRequestRecord {
        key_hash: B256::repeat_byte(0xAA),
        seed: format!("{:064x}", 12345),
        sender: Address::repeat_byte(0x11),
        request_id: B256::repeat_byte(id_byte),
        block_hash: keccak256(block.to_be_bytes()),
        block_number: block,
        tx_hash: B256::repeat_byte(0x22),
        status: RequestStatus::Success,
        fulfillment_tx: Some(B256::repeat_byte(0x33)),
        error: None,
        recorded_at: 1_700_000_000,
    }
}
