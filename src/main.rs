//! VOR Oracle Node
//!
//! Off-chain service that polls the VOR coordinator contract for randomness
//! requests addressed to this oracle's proving key and fulfills them. Runs two
//! concurrent subsystems:
//!
//! - **Chain poller** — filters coordinator logs from the checkpoint, matches
//!   key hashes, dispatches fulfillments and advances the checkpoint.
//! - **HTTP server** — probes, ledger lookups and manual oracle operations.

use actix_web::web;
use anyhow::Context;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod chain;
mod config;
mod coordinator;
mod decoder;
mod fulfiller;
mod identity;
mod listener;
mod metrics;
mod storage;
#[cfg(test)]
mod testing;
mod transactor;
mod vrf;

use chain::{ChainClient, RpcChainClient};
use config::AppConfig;
use coordinator::CoordinatorCaller;
use decoder::KeyMatcher;
use fulfiller::Dispatcher;
use identity::OracleIdentity;
use listener::{ChainPoller, FilterCursor};
use metrics::Metrics;
use storage::SledStore;
use transactor::Transactor;
use vrf::HmacProver;

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,reqwest=warn,sled=warn", config.log_level))
    });

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(true)
                .init();
        }
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config)?;

    let identity = OracleIdentity::from_env(&config.keystore_path)
        .context("failed to load oracle key")?;

    info!(
        contract = %config.contract_address,
        oracle = %identity.address(),
        account = ?config.keystore_account,
        chain_id = config.chain_id,
        "Starting VOR oracle"
    );
    info!(rpc = %config.rpc_url, database = %config.database_path.display(), "Endpoints configured");

    let store = Arc::new(
        SledStore::open(&config.database_path)
            .with_context(|| format!("failed to open store at {}", config.database_path.display()))?,
    );

    let chain: Arc<dyn ChainClient> =
        Arc::new(RpcChainClient::connect(config.rpc_url.clone(), identity.wallet()));
    let head = chain
        .block_number()
        .await
        .context("failed to reach the RPC node")?;
    info!(head, "Connected to chain");

    let transactor = Arc::new(Transactor::new(
        chain.clone(),
        identity.address(),
        config.chain_id,
        config.gas_limit,
        config.gas_price,
    ));
    let caller = Arc::new(CoordinatorCaller::new(
        config.contract_address,
        chain.clone(),
        transactor,
        identity.proving_key(),
    ));

    let key_hash = caller
        .hash_of_key()
        .await
        .context("failed to fetch key hash from coordinator")?;
    if key_hash != identity.local_key_hash() {
        warn!(
            on_chain = %key_hash,
            local = %identity.local_key_hash(),
            "Coordinator key hash differs from the locally derived one"
        );
    }
    info!(key_hash = %key_hash, verify = config.verify_key_hash, "Proving key loaded");

    let from_block = listener::resolve_start_block(&*store, &*store, config.first_block)
        .context("failed to resolve start block")?;
    if from_block > head.saturating_add(1) {
        warn!(from_block, head, "Checkpoint is ahead of the chain head");
    }

    let secret = config
        .vrf_secret
        .clone()
        .unwrap_or_else(|| identity.secret_bytes().to_vec());
    let prover = Arc::new(HmacProver::new(secret, identity.proving_key()));
    let dispatcher = Dispatcher::new(caller.clone(), prover, store.clone());

    let metrics = Arc::new(Metrics::new());
    let poller = ChainPoller::new(
        chain,
        FilterCursor {
            from_block,
            address: config.contract_address,
        },
        store.clone(),
        store.clone(),
        KeyMatcher::new(key_hash, config.verify_key_hash),
        dispatcher,
        config.poll_interval,
        metrics.clone(),
    );

    let state = web::Data::new(api::AppState {
        metrics,
        caller,
        ledger: store.clone(),
        oracle_address: identity.address(),
        public_key: identity.public_key(),
        key_hash,
    });

    // Bind before the poller is spawned.
    let (host, port) = config.http_addr();
    let server = api::bind_server(state, (host.clone(), port))
        .with_context(|| format!("failed to bind HTTP server on {host}:{port}"))?;

    let cancel = CancellationToken::new();
    let poller_handle = tokio::spawn(poller.run(cancel.clone()));

    info!(host = %host, port, "Starting HTTP server");
    let served = server.await;

    info!("Shutting down");
    cancel.cancel();
    if let Err(e) = poller_handle.await {
        warn!(error = %e, "Chain poller task ended abnormally");
    }
    store.flush().await.context("failed to flush store")?;

    served.context("HTTP server failed")
}
