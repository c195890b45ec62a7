//! Seed derivation and the VRF proof capability.
//!
//! The coordinator emits the consumer seed as a `uint256`; provers work on
//! its 32-byte big-endian encoding. [`VrfProver`] is the seam for the proof
//! computation. [`HmacProver`] is the bundled implementation: a keyed
//! HMAC-SHA256 output that is deterministic (same inputs, same output) but
//! unpredictable without the oracle secret.

use alloy::primitives::{B256, Bytes, U256};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::identity::ProvingKey;

type HmacSha256 = Hmac<Sha256>;

/// Encoded proof length of [`HmacProver`]: six 32-byte words.
pub const PROOF_LEN: usize = 6 * 32;

#[derive(Debug, Error)]
#[error("proof generation failed: {0}")]
pub struct ProverError(pub String);

/// Fixed-width big-endian encoding of a request seed.
pub fn derive_seed(seed: U256) -> [u8; 32] {
    seed.to_be_bytes::<32>()
}

/// Inverse of [`derive_seed`].
#[cfg(test)]
pub fn seed_to_u256(seed: &[u8; 32]) -> U256 {
    U256::from_be_bytes(*seed)
}

pub trait VrfProver: Send + Sync {
    /// Produce the `fulfillRandomnessRequest` proof for a request observed in
    /// block `block_number` with hash `block_hash`.
    fn prove(&self, seed: &[u8; 32], block_hash: B256, block_number: u64)
        -> Result<Bytes, ProverError>;
}

pub struct HmacProver {
    secret: Vec<u8>,
    proving_key: ProvingKey,
}

impl HmacProver {
    pub fn new(secret: Vec<u8>, proving_key: ProvingKey) -> Self {
        Self {
            secret,
            proving_key,
        }
    }

    /// ```text
    /// output = HMAC-SHA256(secret, seed || block_hash || block_number_be)
    /// ```
    pub fn output(
        &self,
        seed: &[u8; 32],
        block_hash: B256,
        block_number: u64,
    ) -> Result<[u8; 32], ProverError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ProverError(e.to_string()))?;

        mac.update(seed);
        mac.update(block_hash.as_slice());
        mac.update(&block_number.to_be_bytes());

        let mut output = [0u8; 32];
        output.copy_from_slice(&mac.finalize().into_bytes());
        Ok(output)
    }
}

impl VrfProver for HmacProver {
    /// Layout: `X ‖ Y ‖ seed ‖ block_hash ‖ block_number (uint256) ‖ output`.
    fn prove(
        &self,
        seed: &[u8; 32],
        block_hash: B256,
        block_number: u64,
    ) -> Result<Bytes, ProverError> {
        let output = self.output(seed, block_hash, block_number)?;

        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.extend_from_slice(&self.proving_key[0].to_be_bytes::<32>());
        proof.extend_from_slice(&self.proving_key[1].to_be_bytes::<32>());
        proof.extend_from_slice(seed);
        proof.extend_from_slice(block_hash.as_slice());
        proof.extend_from_slice(&U256::from(block_number).to_be_bytes::<32>());
        proof.extend_from_slice(&output);

        Ok(proof.into())
    }
}
