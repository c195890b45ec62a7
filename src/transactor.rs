//! Transaction parameter management for the oracle account.
//!
//! Every state-changing call goes through [`Transactor::transact`], which
//! holds the parameter lock for the whole refresh-build-submit sequence. Two
//! callers sharing one identity therefore never observe the same nonce.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::chain::{ChainClient, ChainError};

#[derive(Debug, Error)]
pub enum TransactError {
    /// Nonce or gas price could not be read; nothing was submitted.
    #[error("failed to prepare transaction: {0}")]
    Prepare(#[source] ChainError),
    /// The transaction was built but the node or signer refused it.
    #[error("transaction submission failed: {0}")]
    Submit(#[source] ChainError),
}

/// Parameters applied to the next outgoing transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionParameters {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub value: U256,
}

pub struct Transactor {
    chain: Arc<dyn ChainClient>,
    from: Address,
    chain_id: u64,
    gas_price_override: Option<u128>,
    params: Mutex<TransactionParameters>,
}

impl Transactor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        from: Address,
        chain_id: u64,
        gas_limit: u64,
        gas_price_override: Option<u128>,
    ) -> Self {
        Self {
            chain,
            from,
            chain_id,
            gas_price_override,
            params: Mutex::new(TransactionParameters {
                gas_limit,
                ..Default::default()
            }),
        }
    }

    pub fn from_address(&self) -> Address {
        self.from
    }

    /// Snapshot of the parameters used by the most recent transaction.
    #[cfg(test)]
    pub async fn parameters(&self) -> TransactionParameters {
        self.params.lock().await.clone()
    }

    /// Refresh nonce and gas price, then sign and submit a call to `to`.
    ///
    /// Does not wait for the transaction to be mined.
    pub async fn transact(
        &self,
        to: Address,
        input: Bytes,
        value: U256,
    ) -> Result<TxHash, TransactError> {
        let mut params = self.params.lock().await;

        params.nonce = self
            .chain
            .pending_nonce(self.from)
            .await
            .map_err(TransactError::Prepare)?;
        params.gas_price = match self.gas_price_override {
            Some(price) => price,
            None => self
                .chain
                .suggest_gas_price()
                .await
                .map_err(TransactError::Prepare)?,
        };
        params.value = value;

        debug!(
            nonce = params.nonce,
            gas_price = params.gas_price,
            gas_limit = params.gas_limit,
            %value,
            %to,
            "Submitting transaction"
        );

        let request = TransactionRequest::default()
            .with_from(self.from)
            .with_to(to)
            .with_input(input)
            .with_nonce(params.nonce)
            .with_gas_price(params.gas_price)
            .with_gas_limit(params.gas_limit)
            .with_value(params.value)
            .with_chain_id(self.chain_id);

        let result = self.chain.send_transaction(request).await;

        // Payable calls set the value for one transaction only.
        params.value = U256::ZERO;

        result.map_err(TransactError::Submit)
    }
}
