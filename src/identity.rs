//! Oracle signing identity and proving key.

use alloy::network::EthereumWallet;
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::fmt;
use std::path::Path;

/// Uncompressed secp256k1 public point `(X, Y)` as registered on the coordinator.
pub type ProvingKey = [U256; 2];

/// The oracle's signing key together with everything derived from it.
///
/// Immutable for the lifetime of the process.
#[derive(Clone)]
pub struct OracleIdentity {
    signer: PrivateKeySigner,
    proving_key: ProvingKey,
}

impl OracleIdentity {
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let point = signer
            .credential()
            .verifying_key()
            .as_affine()
            .to_encoded_point(false);
        // Uncompressed points always carry both coordinates.
        let x = point.x().map(|x| U256::from_be_slice(x)).unwrap_or_default();
        let y = point.y().map(|y| U256::from_be_slice(y)).unwrap_or_default();

        Self {
            signer,
            proving_key: [x, y],
        }
    }

    /// Parse a hex private key, with or without the `0x` prefix.
    pub fn from_private_key_hex(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("invalid oracle private key")?;
        Ok(Self::from_signer(signer))
    }

    /// Decrypt an Ethereum JSON keystore.
    pub fn from_keystore(path: &Path, password: &str) -> Result<Self> {
        let signer = PrivateKeySigner::decrypt_keystore(path, password)
            .with_context(|| format!("failed to decrypt keystore {}", path.display()))?;
        Ok(Self::from_signer(signer))
    }

    /// Load from `ORACLE_PRIVATE_KEY`, else decrypt the keystore with
    /// `KEYSTORE_PASSWORD`.
    pub fn from_env(keystore_path: &Path) -> Result<Self> {
        if let Ok(key) = std::env::var("ORACLE_PRIVATE_KEY") {
            return Self::from_private_key_hex(&key);
        }
        let password = std::env::var("KEYSTORE_PASSWORD")
            .context("either ORACLE_PRIVATE_KEY or KEYSTORE_PASSWORD must be set")?;
        Self::from_keystore(keystore_path, &password)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn proving_key(&self) -> ProvingKey {
        self.proving_key
    }

    /// 65-byte uncompressed public key (`0x04 ‖ X ‖ Y`).
    pub fn public_key(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.push(0x04);
        out.extend_from_slice(&self.proving_key[0].to_be_bytes::<32>());
        out.extend_from_slice(&self.proving_key[1].to_be_bytes::<32>());
        out
    }

    /// `keccak256(X ‖ Y)`, the same digest the coordinator's `hashOfKey` returns.
    pub fn local_key_hash(&self) -> B256 {
        keccak256(&self.public_key()[1..])
    }

    /// Raw private key bytes. Only used to key the local prover.
    pub fn secret_bytes(&self) -> B256 {
        self.signer.to_bytes()
    }

    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl fmt::Debug for OracleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleIdentity")
            .field("address", &self.address())
            .field("key_hash", &self.local_key_hash())
            .finish_non_exhaustive()
    }
}
