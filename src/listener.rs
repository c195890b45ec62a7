//! Chain poller for the VOR coordinator.
//!
//! The poller repeatedly asks the node for every coordinator log from the
//! checkpoint to the head, then walks them in `(block, log index)` order:
//!
//! 1. **Decode** ([`decode`]): other events are ignored, malformed
//!    `RandomnessRequest` payloads abort the batch.
//! 2. **Match** ([`KeyMatcher`]): requests for other oracles are skipped.
//! 3. **Dedupe**: requests already in the ledger are skipped, which makes a
//!    re-scan after a crash or an aborted batch harmless.
//! 4. **Dispatch** ([`Dispatcher`]): prove, submit, record.
//!
//! Only when the last log of a batch has been handled does the checkpoint
//! move, to that log's block + 1. Any error before that leaves the checkpoint
//! where it was and the same range is fetched again on the next iteration.

use alloy::primitives::Address;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::decoder::{decode, DecodeError, KeyMatcher};
use crate::fulfiller::{DispatchError, Dispatcher};
use crate::metrics::Metrics;
use crate::storage::{CheckpointStore, RequestLedger, RequestStatus, StorageError};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch logs from block {from_block}: {source}")]
    Transport {
        from_block: u64,
        #[source]
        source: ChainError,
    },
    #[error("failed to decode log {log_index:?} in block {block:?}: {source}")]
    Decode {
        block: Option<u64>,
        log_index: Option<u64>,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("poller cancelled")]
    Cancelled,
}

/// Query window of the next log fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterCursor {
    pub from_block: u64,
    pub address: Address,
}

/// Per-iteration summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub logs: usize,
    pub matched: usize,
    pub fulfilled: usize,
    pub failed: usize,
    pub foreign: usize,
    pub duplicates: usize,
    /// New checkpoint, when this batch moved it.
    pub checkpoint: Option<u64>,
}

/// Pick the first block to scan.
///
/// Order: persisted checkpoint, block of the last recorded request,
/// configured first block, block 1.
pub fn resolve_start_block(
    checkpoints: &dyn CheckpointStore,
    ledger: &dyn RequestLedger,
    first_block: u64,
) -> Result<u64, StorageError> {
    let checkpoint = checkpoints.checkpoint()?;
    if checkpoint != 0 {
        return Ok(checkpoint);
    }
    if let Some(last) = ledger.last()? {
        return Ok(last.block_number);
    }
    if first_block != 0 {
        return Ok(first_block);
    }
    Ok(1)
}

/// Random delay in `[1ms, max]`.
pub fn jittered_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(1..=max_ms))
}

pub struct ChainPoller {
    chain: Arc<dyn ChainClient>,
    cursor: FilterCursor,
    checkpoints: Arc<dyn CheckpointStore>,
    ledger: Arc<dyn RequestLedger>,
    matcher: KeyMatcher,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    metrics: Arc<Metrics>,
}

impl ChainPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        cursor: FilterCursor,
        checkpoints: Arc<dyn CheckpointStore>,
        ledger: Arc<dyn RequestLedger>,
        matcher: KeyMatcher,
        dispatcher: Dispatcher,
        poll_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.set_checkpoint(cursor.from_block);
        Self {
            chain,
            cursor,
            checkpoints,
            ledger,
            matcher,
            dispatcher,
            poll_interval,
            metrics,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> FilterCursor {
        self.cursor
    }

    /// Poll until `cancel` fires. Errors are logged and retried after the
    /// regular delay; they never end the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            contract = %self.cursor.address,
            from_block = self.cursor.from_block,
            key_hash = %self.matcher.own_key_hash(),
            "Starting chain poller"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once(&cancel).await {
                Ok(outcome) if outcome.logs > 0 => info!(
                    logs = outcome.logs,
                    matched = outcome.matched,
                    fulfilled = outcome.fulfilled,
                    failed = outcome.failed,
                    foreign = outcome.foreign,
                    duplicates = outcome.duplicates,
                    checkpoint = ?outcome.checkpoint,
                    "Processed log batch"
                ),
                Ok(_) => debug!(from_block = self.cursor.from_block, "No new logs"),
                Err(PollError::Cancelled) => break,
                Err(e) => {
                    self.metrics.record_poll_error();
                    error!(error = %e, from_block = self.cursor.from_block, "Poll iteration failed");
                }
            }

            let delay = jittered_delay(self.poll_interval);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(checkpoint = self.cursor.from_block, "Chain poller stopped");
    }

    /// Fetch and process one batch of logs.
    ///
    /// `cancel` only interrupts the log fetch. Once processing has started
    /// every dispatch runs to completion so no nonce is spent unrecorded.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<PollOutcome, PollError> {
        let from_block = self.cursor.from_block;

        let mut logs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            result = self.chain.filter_logs(from_block, self.cursor.address) => {
                result.map_err(|source| PollError::Transport { from_block, source })?
            }
        };

        logs.sort_by_key(|log| (log.block_number, log.log_index));
        self.metrics.record_logs(logs.len());

        let mut outcome = PollOutcome {
            logs: logs.len(),
            ..Default::default()
        };

        for log in &logs {
            let event = decode(log).map_err(|source| PollError::Decode {
                block: log.block_number,
                log_index: log.log_index,
                source,
            })?;
            let Some(event) = event else {
                debug!(block = ?log.block_number, topic = ?log.inner.data.topics().first(), "Ignoring unrelated log");
                continue;
            };

            if !self.matcher.matches(&event) {
                outcome.foreign += 1;
                self.metrics.record_foreign();
                info!(
                    request_id = %event.request_id,
                    key_hash = %event.key_hash,
                    block = event.block_number,
                    "Request addressed to another oracle, skipping"
                );
                continue;
            }

            outcome.matched += 1;
            self.metrics.record_match();

            if self.ledger.contains(&event.request_id)? {
                outcome.duplicates += 1;
                self.metrics.record_duplicate();
                debug!(request_id = %event.request_id, "Request already recorded, skipping");
                continue;
            }

            info!(
                request_id = %event.request_id,
                requester = %event.sender,
                seed = %event.seed,
                fee = %event.fee,
                block = event.block_number,
                log_index = event.log_index,
                "Received RandomnessRequest event"
            );

            let record = self.dispatcher.fulfill(&event).await?;
            match record.status {
                RequestStatus::Success => {
                    outcome.fulfilled += 1;
                    self.metrics.record_fulfillment();
                }
                RequestStatus::Failed => {
                    outcome.failed += 1;
                    self.metrics.record_failure();
                }
            }
        }

        match logs.last().map(|log| log.block_number) {
            Some(Some(last_block)) => {
                let next = last_block.saturating_add(1).max(self.cursor.from_block);
                self.checkpoints.set_checkpoint(next)?;
                self.cursor.from_block = next;
                self.metrics.set_checkpoint(next);
                outcome.checkpoint = Some(next);
            }
            Some(None) => warn!("Last log of batch has no block number, checkpoint not moved"),
            None => {}
        }

        Ok(outcome)
    }
}
