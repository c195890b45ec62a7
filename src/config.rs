//! Application configuration loaded from a JSON document.
//!
//! The document path comes from `ORACLE_CONFIG` (default `./config.json`).
//! Required keys: `contract_address`, `eth_http_host`, `network_id`.
//! Everything else falls back to the defaults below. Secrets never live in
//! the document: the signing key comes from `ORACLE_PRIVATE_KEY` or from the
//! keystore decrypted with `KEYSTORE_PASSWORD` (see [`crate::identity`]).

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Poll interval used when `check_duration` is zero.
const FALLBACK_CHECK_DURATION_SECS: u64 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct ServeSection {
    #[serde(default = "default_serve_host")]
    pub host: String,
    #[serde(default = "default_serve_port")]
    pub port: u16,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            host: default_serve_host(),
            port: default_serve_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystorageSection {
    #[serde(default = "default_keystore_file")]
    pub file: String,
    #[serde(default)]
    pub account: Option<String>,
}

impl Default for KeystorageSection {
    fn default() -> Self {
        Self {
            file: default_keystore_file(),
            account: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Raw shape of the configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub contract_address: Address,
    pub eth_http_host: String,
    pub network_id: u64,
    #[serde(default = "default_first_block", rename = "first_block")]
    pub first_block_number: u64,
    #[serde(default = "default_check_duration")]
    pub check_duration: u64,
    #[serde(default)]
    pub serve: ServeSection,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: Option<u64>,
    #[serde(default)]
    pub keystorage: KeystorageSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default = "default_verify_key_hash")]
    pub verify_key_hash: bool,
    #[serde(default)]
    pub vrf_secret: Option<String>,
}

fn default_serve_host() -> String {
    "0.0.0.0".into()
}

fn default_serve_port() -> u16 {
    8445
}

fn default_keystore_file() -> String {
    "./keystore.json".into()
}

fn default_database_path() -> String {
    "./oracle-db".into()
}

fn default_first_block() -> u64 {
    1
}

fn default_check_duration() -> u64 {
    15
}

fn default_log_file() -> String {
    "oracle.log".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_gas_limit() -> u64 {
    1_000_000
}

fn default_verify_key_hash() -> bool {
    true
}

/// Application configuration for the VOR oracle node.
///
/// Built once at startup and handed to each component that needs it.
#[derive(Clone)]
pub struct AppConfig {
    /// The deployed VOR coordinator contract.
    pub contract_address: Address,
    /// Ethereum JSON-RPC endpoint (HTTP).
    pub rpc_url: reqwest::Url,
    /// Chain id used when signing transactions.
    pub chain_id: u64,
    /// First block to scan when neither a checkpoint nor a ledger record exists.
    pub first_block: u64,
    /// Upper bound of the randomised delay between poll iterations.
    pub poll_interval: Duration,
    /// HTTP admin server bind host.
    pub http_host: String,
    /// HTTP admin server port.
    pub http_port: u16,
    /// Log destination; `None` logs to stdout.
    pub log_file: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Gas limit applied to every state-changing transaction.
    pub gas_limit: u64,
    /// Fixed gas price in wei; `None` asks the node before each call.
    pub gas_price: Option<u128>,
    /// Encrypted JSON keystore holding the oracle key.
    pub keystore_path: PathBuf,
    /// Account label from the keystore section, informational only.
    pub keystore_account: Option<String>,
    /// Directory of the sled database.
    pub database_path: PathBuf,
    /// Only fulfill requests whose key hash equals ours.
    pub verify_key_hash: bool,
    /// Secret for the HMAC prover; defaults to the signing key bytes.
    pub vrf_secret: Option<Vec<u8>>,
}

impl AppConfig {
    /// Load configuration from the path in `ORACLE_CONFIG`.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("ORACLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let path = shellexpand::tilde(&path).to_string();
        Self::from_file(Path::new(&path))
    }

    /// Load configuration from a JSON document on disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(data: &str) -> Result<Self> {
        let raw: FileConfig = serde_json::from_str(data).context("malformed config document")?;
        Self::try_from(raw)
    }

    /// Bind address for the HTTP admin server.
    pub fn http_addr(&self) -> (String, u16) {
        (self.http_host.clone(), self.http_port)
    }
}

impl TryFrom<FileConfig> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(raw: FileConfig) -> Result<Self> {
        let rpc_url = reqwest::Url::parse(&raw.eth_http_host)
            .with_context(|| format!("invalid eth_http_host: {}", raw.eth_http_host))?;

        let check_duration = match raw.check_duration {
            0 => FALLBACK_CHECK_DURATION_SECS,
            secs => secs,
        };

        let log_file = match raw.log_file.trim() {
            "" => None,
            file => Some(PathBuf::from(shellexpand::tilde(file).to_string())),
        };

        let vrf_secret = raw
            .vrf_secret
            .filter(|s| !s.is_empty())
            .map(String::into_bytes);

        Ok(Self {
            contract_address: raw.contract_address,
            rpc_url,
            chain_id: raw.network_id,
            first_block: raw.first_block_number,
            poll_interval: Duration::from_secs(check_duration),
            http_host: raw.serve.host,
            http_port: raw.serve.port,
            log_file,
            log_level: raw.log_level,
            gas_limit: raw.gas_limit,
            gas_price: raw.gas_price.map(u128::from),
            keystore_path: PathBuf::from(shellexpand::tilde(&raw.keystorage.file).to_string()),
            keystore_account: raw.keystorage.account,
            database_path: PathBuf::from(shellexpand::tilde(&raw.database.path).to_string()),
            verify_key_hash: raw.verify_key_hash,
            vrf_secret,
        })
    }
}
