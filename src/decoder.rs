//! Classifies raw coordinator logs.
//!
//! [`decode`] separates three outcomes: a log that is not a
//! `RandomnessRequest` (`Ok(None)`, just noise from the same contract), a
//! well-formed request (`Ok(Some(_))`), and a request whose payload cannot be
//! decoded (`Err(_)`). Only the last one aborts a polling batch.

use alloy::primitives::{Address, B256, TxHash, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use thiserror::Error;

use crate::coordinator::IVORCoordinator::RandomnessRequest;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed RandomnessRequest payload: {0}")]
    Abi(#[from] alloy::sol_types::Error),
    #[error("RandomnessRequest log is missing its {0}")]
    MissingField(&'static str),
}

/// A decoded `RandomnessRequest` together with the position of its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessRequestEvent {
    pub key_hash: B256,
    pub seed: U256,
    pub sender: Address,
    pub fee: U256,
    pub request_id: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u64,
}

pub fn decode(log: &Log) -> Result<Option<RandomnessRequestEvent>, DecodeError> {
    if log.inner.data.topics().first() != Some(&RandomnessRequest::SIGNATURE_HASH) {
        return Ok(None);
    }

    let event = RandomnessRequest::decode_log_data(&log.inner.data)?;

    Ok(Some(RandomnessRequestEvent {
        key_hash: event.keyHash,
        seed: event.seed,
        sender: event.sender,
        fee: event.fee,
        request_id: event.requestID,
        block_hash: log.block_hash.ok_or(DecodeError::MissingField("block hash"))?,
        block_number: log
            .block_number
            .ok_or(DecodeError::MissingField("block number"))?,
        tx_hash: log
            .transaction_hash
            .ok_or(DecodeError::MissingField("transaction hash"))?,
        log_index: log.log_index.ok_or(DecodeError::MissingField("log index"))?,
    }))
}

/// Decides whether a request is addressed to this oracle.
#[derive(Debug, Clone, Copy)]
pub struct KeyMatcher {
    own_key_hash: B256,
    verify: bool,
}

impl KeyMatcher {
    pub fn new(own_key_hash: B256, verify: bool) -> Self {
        Self {
            own_key_hash,
            verify,
        }
    }

    pub fn own_key_hash(&self) -> B256 {
        self.own_key_hash
    }

    /// Exact byte equality of key hashes. Always true with verification off.
    pub fn matches(&self, event: &RandomnessRequestEvent) -> bool {
        !self.verify || event.key_hash == self.own_key_hash
    }
}
