//! Fulfillment dispatcher: turns a matched request into an on-chain
//! `fulfillRandomnessRequest` call and records the outcome.
//!
//! Every request that reaches submission is written to the ledger, whether
//! the node accepted the transaction or not, so operators can audit and
//! retry failures by hand. A transaction accepted by the node is recorded as
//! `success` even if it later reverts; receipts are not tracked.

use alloy::hex;
use alloy::primitives::TxHash;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::chain::ChainError;
use crate::coordinator::CoordinatorCaller;
use crate::decoder::RandomnessRequestEvent;
use crate::storage::{RandomnessRequestRecord, RequestLedger, RequestStatus, StorageError};
use crate::transactor::TransactError;
use crate::vrf::{derive_seed, VrfProver};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nonce or gas price unavailable. Nothing was submitted or recorded.
    #[error("could not prepare fulfillment: {0}")]
    Prepare(#[source] ChainError),
    #[error("failed to record request outcome: {0}")]
    Ledger(#[from] StorageError),
}

pub struct Dispatcher {
    caller: Arc<CoordinatorCaller>,
    prover: Arc<dyn VrfProver>,
    ledger: Arc<dyn RequestLedger>,
}

impl Dispatcher {
    pub fn new(
        caller: Arc<CoordinatorCaller>,
        prover: Arc<dyn VrfProver>,
        ledger: Arc<dyn RequestLedger>,
    ) -> Self {
        Self {
            caller,
            prover,
            ledger,
        }
    }

    /// Prove, submit and record one request.
    #[instrument(skip_all, fields(request_id = %event.request_id, block = event.block_number))]
    pub async fn fulfill(
        &self,
        event: &RandomnessRequestEvent,
    ) -> Result<RandomnessRequestRecord, DispatchError> {
        let seed = derive_seed(event.seed);

        let outcome = match self.prover.prove(&seed, event.block_hash, event.block_number) {
            Ok(proof) => match self.caller.fulfill_randomness_request(proof).await {
                Ok(tx) => Ok(tx),
                Err(TransactError::Prepare(e)) => return Err(DispatchError::Prepare(e)),
                Err(TransactError::Submit(e)) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        let record = build_record(event, &seed, outcome);
        self.ledger.insert(&record)?;

        match (&record.fulfillment_tx, &record.error) {
            (Some(tx), _) => info!(
                requester = %event.sender,
                fulfillment_tx = %tx,
                "Fulfillment submitted"
            ),
            (None, reason) => error!(
                requester = %event.sender,
                reason = reason.as_deref().unwrap_or("unknown"),
                "Fulfillment failed, recorded for manual retry"
            ),
        }

        Ok(record)
    }
}

fn build_record(
    event: &RandomnessRequestEvent,
    seed: &[u8; 32],
    outcome: Result<TxHash, String>,
) -> RandomnessRequestRecord {
    let (status, fulfillment_tx, error) = match outcome {
        Ok(tx) => (RequestStatus::Success, Some(tx), None),
        Err(reason) => (RequestStatus::Failed, None, Some(reason)),
    };
    let recorded_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    RandomnessRequestRecord {
        key_hash: event.key_hash,
        seed: hex::encode(seed),
        sender: event.sender,
        request_id: event.request_id,
        block_hash: event.block_hash,
        block_number: event.block_number,
        tx_hash: event.tx_hash,
        status,
        fulfillment_tx,
        error,
        recorded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::IVORCoordinator;
    use crate::decoder::decode;
    use crate::testing::{request_log, sample_request, FailingProver, Harness};
    use alloy::primitives::{B256, Bytes, U256};
    use alloy::sol_types::SolCall;
    use std::sync::atomic::Ordering;

    fn event() -> RandomnessRequestEvent {
        decode(&request_log(&sample_request(B256::repeat_byte(0xAA)), 1000, 0))
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_submission_is_recorded() {
        let harness = Harness::new();
        let record = harness.dispatcher().fulfill(&event()).await.unwrap();

        assert_eq!(record.status, RequestStatus::Success);
        assert_eq!(record.block_number, 1000);
        assert_eq!(record.seed, format!("{:064x}", 12345));
        assert!(record.fulfillment_tx.is_some());
        assert_eq!(harness.store.get(&record.request_id).unwrap(), Some(record));

        let input = harness.chain.sent()[0].input.input().cloned().unwrap();
        let call = IVORCoordinator::fulfillRandomnessRequestCall::abi_decode(&input).unwrap();
        let proof: Bytes = call.proof;
        assert_eq!(U256::from_be_slice(&proof[64..96]), U256::from(12345));
    }

    #[tokio::test]
    async fn rejected_submission_is_recorded_as_failed() {
        let harness = Harness::new();
        harness.chain.reject_sends.store(true, Ordering::SeqCst);

        let record = harness.dispatcher().fulfill(&event()).await.unwrap();
        assert_eq!(record.status, RequestStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("rejected"));
        assert_eq!(harness.store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn prover_failure_is_recorded_without_submission() {
        let harness = Harness::new();
        let dispatcher = Dispatcher::new(
            harness.caller.clone(),
            Arc::new(FailingProver),
            harness.store.clone(),
        );

        let record = dispatcher.fulfill(&event()).await.unwrap();
        assert_eq!(record.status, RequestStatus::Failed);
        assert!(harness.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn prepare_failure_records_nothing() {
        let harness = Harness::new();
        harness.chain.fail_nonce.store(true, Ordering::SeqCst);

        let err = harness.dispatcher().fulfill(&event()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Prepare(_)));
        assert_eq!(harness.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_request_surfaces_ledger_error() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher();
        dispatcher.fulfill(&event()).await.unwrap();

        let err = dispatcher.fulfill(&event()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Ledger(StorageError::Duplicate(_))));
    }
}
