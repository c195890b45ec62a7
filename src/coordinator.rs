//! Typed facade over the VOR coordinator contract.
//!
//! Read-only methods go through `eth_call`; state-changing methods go through
//! the [`Transactor`], which refreshes the nonce right before submission.
//! None of the write methods wait for the transaction to be mined.

use alloy::primitives::{Address, B256, Bytes, TxHash, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::chain::{ChainClient, ChainError};
use crate::identity::ProvingKey;
use crate::transactor::{TransactError, Transactor};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IVORCoordinator {
        event RandomnessRequest(bytes32 keyHash, uint256 seed, address sender, uint256 fee, bytes32 requestID);

        function getTotalGasDeposits() external view returns (uint256);
        function getGasTopUpLimit() external view returns (uint256);
        function hashOfKey(uint256[2] memory publicKey) external pure returns (bytes32);

        function withdraw(address recipient, uint256 amount) external;
        function registerProvingKey(uint256 fee, address oracle, uint256[2] calldata publicProvingKey, bool providerPaysGas) external;
        function randomnessRequest(bytes32 keyHash, uint256 consumerSeed, uint256 feePaid) external;
        function changeFee(uint256[2] calldata publicProvingKey, uint256 fee) external;
        function topUpGas(address oracle) external payable;
        function setProviderPaysGas(uint256[2] calldata publicProvingKey, bool providerPays) external;
        function fulfillRandomnessRequest(bytes memory proof) external;
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("unexpected return data: {0}")]
    Decode(#[from] alloy::sol_types::Error),
}

pub struct CoordinatorCaller {
    address: Address,
    chain: Arc<dyn ChainClient>,
    transactor: Arc<Transactor>,
    proving_key: ProvingKey,
}

impl CoordinatorCaller {
    pub fn new(
        address: Address,
        chain: Arc<dyn ChainClient>,
        transactor: Arc<Transactor>,
        proving_key: ProvingKey,
    ) -> Self {
        Self {
            address,
            chain,
            transactor,
            proving_key,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, CallError> {
        let output = self.chain.call(self.address, call.abi_encode().into()).await?;
        Ok(C::abi_decode_returns(&output)?)
    }

    async fn send<C: SolCall>(&self, call: C, value: U256) -> Result<TxHash, TransactError> {
        self.transactor
            .transact(self.address, call.abi_encode().into(), value)
            .await
    }

    pub async fn total_gas_deposits(&self) -> Result<U256, CallError> {
        self.view(IVORCoordinator::getTotalGasDepositsCall {}).await
    }

    pub async fn gas_top_up_limit(&self) -> Result<U256, CallError> {
        self.view(IVORCoordinator::getGasTopUpLimitCall {}).await
    }

    /// Key hash the coordinator assigns to this oracle's proving key.
    pub async fn hash_of_key(&self) -> Result<B256, CallError> {
        self.view(IVORCoordinator::hashOfKeyCall {
            publicKey: self.proving_key,
        })
        .await
    }

    pub async fn withdraw(&self, recipient: Address, amount: U256) -> Result<TxHash, TransactError> {
        info!(%recipient, %amount, "Withdrawing oracle earnings");
        self.send(IVORCoordinator::withdrawCall { recipient, amount }, U256::ZERO)
            .await
    }

    pub async fn register_proving_key(
        &self,
        fee: U256,
        provider_pays_gas: bool,
    ) -> Result<TxHash, TransactError> {
        info!(%fee, provider_pays_gas, "Registering proving key");
        let call = IVORCoordinator::registerProvingKeyCall {
            fee,
            oracle: self.transactor.from_address(),
            publicProvingKey: self.proving_key,
            providerPaysGas: provider_pays_gas,
        };
        self.send(call, U256::ZERO).await
    }

    pub async fn randomness_request(
        &self,
        key_hash: B256,
        seed: U256,
        fee: U256,
    ) -> Result<TxHash, TransactError> {
        let call = IVORCoordinator::randomnessRequestCall {
            keyHash: key_hash,
            consumerSeed: seed,
            feePaid: fee,
        };
        self.send(call, U256::ZERO).await
    }

    pub async fn change_fee(&self, fee: U256) -> Result<TxHash, TransactError> {
        info!(%fee, "Changing oracle fee");
        let call = IVORCoordinator::changeFeeCall {
            publicProvingKey: self.proving_key,
            fee,
        };
        self.send(call, U256::ZERO).await
    }

    /// Deposit `amount` wei towards fulfillment gas. Payable.
    pub async fn top_up_gas(&self, amount: U256) -> Result<TxHash, TransactError> {
        info!(%amount, "Topping up gas deposit");
        let call = IVORCoordinator::topUpGasCall {
            oracle: self.transactor.from_address(),
        };
        self.send(call, amount).await
    }

    pub async fn set_provider_pays_gas(&self, provider_pays: bool) -> Result<TxHash, TransactError> {
        info!(provider_pays, "Setting provider-pays-gas flag");
        let call = IVORCoordinator::setProviderPaysGasCall {
            publicProvingKey: self.proving_key,
            providerPays: provider_pays,
        };
        self.send(call, U256::ZERO).await
    }

    pub async fn fulfill_randomness_request(&self, proof: Bytes) -> Result<TxHash, TransactError> {
        self.send(IVORCoordinator::fulfillRandomnessRequestCall { proof }, U256::ZERO)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dev_identity, FakeChain};
    use alloy::primitives::address;
    use alloy::sol_types::SolValue;
    use std::sync::atomic::Ordering;

    const COORDINATOR: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");

    fn caller(chain: &Arc<FakeChain>) -> CoordinatorCaller {
        let identity = dev_identity();
        let transactor = Arc::new(Transactor::new(
            chain.clone(),
            identity.address(),
            31337,
            1_000_000,
            None,
        ));
        CoordinatorCaller::new(COORDINATOR, chain.clone(), transactor, identity.proving_key())
    }

    fn sent_input(chain: &FakeChain, index: usize) -> Bytes {
        chain.sent()[index].input.input().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn reads_decode_return_values() {
        let chain = Arc::new(FakeChain::new());
        chain.set_call_result(
            IVORCoordinator::getTotalGasDepositsCall::SELECTOR,
            U256::from(42).abi_encode(),
        );
        chain.set_call_result(
            IVORCoordinator::hashOfKeyCall::SELECTOR,
            B256::repeat_byte(0xAA).abi_encode(),
        );

        let caller = caller(&chain);
        assert_eq!(caller.total_gas_deposits().await.unwrap(), U256::from(42));
        assert_eq!(caller.hash_of_key().await.unwrap(), B256::repeat_byte(0xAA));
    }

    #[tokio::test]
    async fn short_return_data_is_a_decode_error() {
        let chain = Arc::new(FakeChain::new());
        chain.set_call_result(IVORCoordinator::getGasTopUpLimitCall::SELECTOR, vec![1, 2, 3]);
        let err = caller(&chain).gas_top_up_limit().await.unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
    }

    #[tokio::test]
    async fn register_uses_own_address_and_key() {
        let chain = Arc::new(FakeChain::new());
        caller(&chain)
            .register_proving_key(U256::from(10), true)
            .await
            .unwrap();

        let call =
            IVORCoordinator::registerProvingKeyCall::abi_decode(&sent_input(&chain, 0)).unwrap();
        let identity = dev_identity();
        assert_eq!(call.oracle, identity.address());
        assert_eq!(call.publicProvingKey, identity.proving_key());
        assert_eq!(call.fee, U256::from(10));
        assert!(call.providerPaysGas);
    }

    #[tokio::test]
    async fn sequential_writes_use_fresh_nonces() {
        let chain = Arc::new(FakeChain::new());
        let caller = caller(&chain);
        caller.change_fee(U256::from(5)).await.unwrap();
        caller.set_provider_pays_gas(false).await.unwrap();
        caller
            .withdraw(Address::repeat_byte(0x33), U256::from(1))
            .await
            .unwrap();

        let nonces: Vec<_> = chain.sent().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![Some(0), Some(1), Some(2)]);
        assert!(chain.sent().iter().all(|tx| tx.to == Some(COORDINATOR.into())));
    }

    #[tokio::test]
    async fn top_up_gas_is_payable() {
        let chain = Arc::new(FakeChain::new());
        let caller = caller(&chain);
        caller.top_up_gas(U256::from(1_000)).await.unwrap();
        caller.fulfill_randomness_request(Bytes::from_static(b"proof")).await.unwrap();

        let sent = chain.sent();
        assert_eq!(sent[0].value, Some(U256::from(1_000)));
        assert_eq!(sent[1].value, Some(U256::ZERO));

        let fulfill =
            IVORCoordinator::fulfillRandomnessRequestCall::abi_decode(&sent_input(&chain, 1))
                .unwrap();
        assert_eq!(fulfill.proof, Bytes::from_static(b"proof"));
    }

    #[tokio::test]
    async fn randomness_request_encodes_arguments() {
        let chain = Arc::new(FakeChain::new());
        chain.nonce.store(9, Ordering::SeqCst);
        caller(&chain)
            .randomness_request(B256::repeat_byte(1), U256::from(12345), U256::from(3))
            .await
            .unwrap();

        let call =
            IVORCoordinator::randomnessRequestCall::abi_decode(&sent_input(&chain, 0)).unwrap();
        assert_eq!(call.keyHash, B256::repeat_byte(1));
        assert_eq!(call.consumerSeed, U256::from(12345));
        assert_eq!(call.feePaid, U256::from(3));
        assert_eq!(chain.sent()[0].nonce, Some(9));
    }
}
