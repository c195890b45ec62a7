//! Chain RPC capability used by the poller and the transaction builder.
//!
//! [`ChainClient`] is the seam between the pipeline and the network. The
//! production adapter, [`RpcChainClient`], wraps an alloy HTTP provider that
//! signs with the oracle wallet. Tests drive the pipeline through a scripted
//! fake instead.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Node unreachable, timed out or returned garbage. Retried by the caller.
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// The node (or the local signer) refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<RpcError<TransportErrorKind>> for ChainError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => ChainError::Rejected(payload.to_string()),
            RpcError::LocalUsageError(e) => ChainError::Rejected(e.to_string()),
            other => ChainError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Logs emitted by `address` from `from_block` (inclusive) to the head.
    async fn filter_logs(&self, from_block: u64, address: Address) -> Result<Vec<Log>, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Transaction count of `address` including pending transactions.
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    async fn suggest_gas_price(&self) -> Result<u128, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;

    /// Sign and broadcast. Returns as soon as the node accepts the transaction.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError>;
}

/// `eth_getLogs` filter for `address` from `from_block` (inclusive) to the
/// latest block.
pub fn log_filter(from_block: u64, address: Address) -> Filter {
    Filter::new().address(address).from_block(from_block)
}

/// [`ChainClient`] over an alloy HTTP provider.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
}

impl RpcChainClient {
    /// Build a provider that signs with `wallet`.
    ///
    /// Recommended fillers are disabled: nonce, gas and chain id are always
    /// set explicitly by [`crate::transactor::Transactor`].
    pub fn connect(rpc_url: reqwest::Url, wallet: EthereumWallet) -> Self {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .wallet(wallet)
            .connect_http(rpc_url)
            .erased();
        Self { provider }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn filter_logs(&self, from_block: u64, address: Address) -> Result<Vec<Log>, ChainError> {
        Ok(self.provider.get_logs(&log_filter(from_block, address)).await?)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn suggest_gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().with_to(to).with_input(input);
        Ok(self.provider.call(request).await?)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        let pending = self.provider.send_transaction(request).await?;
        Ok(*pending.tx_hash())
    }
}
