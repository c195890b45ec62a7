//! Durable pipeline state: the block checkpoint and the request ledger.
//!
//! Both live in one sled database:
//!
//! - `meta` holds the checkpoint under [`CHECKPOINT_KEY`] as a big-endian `u64`.
//! - `requests` maps request id → JSON-encoded [`RandomnessRequestRecord`].
//! - `request_order` maps a monotonic sled id → request id, so the most
//!   recently recorded request can be found without scanning.

use alloy::primitives::{Address, B256, TxHash};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const CHECKPOINT_KEY: &[u8] = b"checkpoint";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request {0} is already recorded")]
    Duplicate(B256),
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt {0} entry")]
    Corrupt(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// The fulfillment transaction was accepted by the node. Whether it
    /// executed successfully on-chain is not tracked.
    Success,
    Failed,
}

/// Outcome of one observed randomness request. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequestRecord {
    pub key_hash: B256,
    /// 32-byte big-endian seed, hex without prefix.
    pub seed: String,
    pub sender: Address,
    pub request_id: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_tx: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp (seconds) of the ledger write.
    pub recorded_at: u64,
}

/// Cursor of the next block the poller has to scan. Zero means unset.
pub trait CheckpointStore: Send + Sync {
    fn checkpoint(&self) -> Result<u64, StorageError>;
    fn set_checkpoint(&self, next_block: u64) -> Result<(), StorageError>;
}

/// Append-only record of every request the oracle attempted.
pub trait RequestLedger: Send + Sync {
    /// Fails with [`StorageError::Duplicate`] when the id is already present.
    fn insert(&self, record: &RandomnessRequestRecord) -> Result<(), StorageError>;
    fn get(&self, request_id: &B256) -> Result<Option<RandomnessRequestRecord>, StorageError>;
    /// Most recently inserted record.
    fn last(&self) -> Result<Option<RandomnessRequestRecord>, StorageError>;
    fn count(&self) -> Result<usize, StorageError>;

    fn contains(&self, request_id: &B256) -> Result<bool, StorageError> {
        Ok(self.get(request_id)?.is_some())
    }
}

pub struct SledStore {
    db: sled::Db,
    meta: sled::Tree,
    requests: sled::Tree,
    order: sled::Tree,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            meta: db.open_tree("meta")?,
            requests: db.open_tree("requests")?,
            order: db.open_tree("request_order")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<RandomnessRequestRecord, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl CheckpointStore for SledStore {
    fn checkpoint(&self) -> Result<u64, StorageError> {
        match self.meta.get(CHECKPOINT_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("checkpoint"))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn set_checkpoint(&self, next_block: u64) -> Result<(), StorageError> {
        self.meta
            .insert(CHECKPOINT_KEY, next_block.to_be_bytes().to_vec())?;
        self.meta.flush()?;
        debug!(next_block, "Checkpoint persisted");
        Ok(())
    }
}

impl RequestLedger for SledStore {
    /// The record and its `request_order` entry are written in one
    /// transaction.
    fn insert(&self, record: &RandomnessRequestRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        let key = record.request_id.as_slice();

        let result = (&self.requests, &self.order).transaction(|(requests, order)| {
            if requests.get(key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(StorageError::Duplicate(
                    record.request_id,
                )));
            }
            requests.insert(key, value.clone())?;
            let seq = order.generate_id()?;
            order.insert(seq.to_be_bytes().to_vec(), key)?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, request_id: &B256) -> Result<Option<RandomnessRequestRecord>, StorageError> {
        self.requests
            .get(request_id.as_slice())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn last(&self) -> Result<Option<RandomnessRequestRecord>, StorageError> {
        let Some((_, id)) = self.order.last()? else {
            return Ok(None);
        };
        match self.requests.get(&id)? {
            Some(bytes) => Self::decode(&bytes).map(Some),
            None => Err(StorageError::Corrupt("request order")),
        }
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.requests.len())
    }
}
