//! HTTP admin surface.
//!
//! Probes (`/health`, `/status`), ledger lookups, and the manual oracle
//! operations: registering the proving key, fee and gas settings, and
//! withdrawing earnings. Write endpoints return the submitted transaction
//! hash without waiting for it to be mined.

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer};
use alloy::hex;
use alloy::primitives::{Address, B256, TxHash, U256};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::coordinator::CoordinatorCaller;
use crate::metrics::Metrics;
use crate::storage::RequestLedger;
use crate::transactor::TransactError;

/// Shared application state accessible from HTTP handlers.
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub caller: Arc<CoordinatorCaller>,
    pub ledger: Arc<dyn RequestLedger>,
    pub oracle_address: Address,
    pub public_key: Vec<u8>,
    pub key_hash: B256,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub address: Address,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub fee: String,
    #[serde(default)]
    pub provider_pays_gas: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeFeeRequest {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct SetProviderPaysGasRequest {
    pub provider_pays: bool,
}

#[derive(Debug, Deserialize)]
pub struct TopUpGasRequest {
    pub amount: String,
}

/// Operator-issued randomness request, used to smoke-test a deployment end
/// to end.
#[derive(Debug, Deserialize)]
pub struct RandomnessRequestBody {
    pub key_hash: B256,
    pub seed: String,
    pub fee: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/status", web::get().to(status))
        .route("/oracle/info", web::get().to(oracle_info))
        .route("/oracle/withdraw", web::post().to(withdraw))
        .route("/oracle/register", web::post().to(register))
        .route("/oracle/fee", web::post().to(change_fee))
        .route("/oracle/provider-pays-gas", web::post().to(set_provider_pays_gas))
        .route("/oracle/top-up-gas", web::post().to(top_up_gas))
        .route("/oracle/request", web::post().to(request_randomness))
        .route("/requests/last", web::get().to(last_request))
        .route("/requests/{id}", web::get().to(get_request));
}

/// Bind the admin server without starting it.
pub fn bind_server(state: web::Data<AppState>, addr: (String, u16)) -> std::io::Result<Server> {
    Ok(HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(addr)?
        .run())
}

fn error_json(message: impl ToString) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

/// Decimal or `0x`-prefixed wei amount.
fn parse_amount(raw: &str) -> Result<U256, HttpResponse> {
    U256::from_str(raw.trim())
        .map_err(|e| HttpResponse::BadRequest().json(error_json(format!("invalid amount {raw:?}: {e}"))))
}

fn tx_response(result: Result<TxHash, TransactError>) -> HttpResponse {
    match result {
        Ok(tx_hash) => HttpResponse::Ok().json(serde_json::json!({ "tx_hash": tx_hash })),
        Err(e @ TransactError::Prepare(_)) => {
            warn!(error = %e, "Admin transaction not prepared");
            HttpResponse::BadGateway().json(error_json(e))
        }
        Err(e @ TransactError::Submit(_)) => {
            warn!(error = %e, "Admin transaction rejected");
            HttpResponse::BadRequest().json(error_json(e))
        }
    }
}

/// Liveness probe — returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Readiness / status probe — pipeline counters and ledger size.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    let recorded = match data.ledger.count() {
        Ok(count) => count,
        Err(e) => return HttpResponse::InternalServerError().json(error_json(e)),
    };
    HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "oracle": data.oracle_address,
        "requests_recorded": recorded,
        "metrics": data.metrics.to_json(),
    }))
}

async fn oracle_info(data: web::Data<AppState>) -> HttpResponse {
    let deposits = data.caller.total_gas_deposits().await;
    let top_up_limit = data.caller.gas_top_up_limit().await;
    match (deposits, top_up_limit) {
        (Ok(deposits), Ok(limit)) => HttpResponse::Ok().json(serde_json::json!({
            "address": data.oracle_address,
            "public_key": hex::encode_prefixed(&data.public_key),
            "key_hash": data.key_hash,
            "contract": data.caller.address(),
            "total_gas_deposits": deposits.to_string(),
            "gas_top_up_limit": limit.to_string(),
        })),
        (Err(e), _) | (_, Err(e)) => HttpResponse::BadGateway().json(error_json(e)),
    }
}

async fn withdraw(data: web::Data<AppState>, body: web::Json<WithdrawRequest>) -> HttpResponse {
    let amount = match parse_amount(&body.amount) {
        Ok(amount) => amount,
        Err(resp) => return resp,
    };
    tx_response(data.caller.withdraw(body.address, amount).await)
}

async fn register(data: web::Data<AppState>, body: web::Json<RegisterRequest>) -> HttpResponse {
    let fee = match parse_amount(&body.fee) {
        Ok(fee) => fee,
        Err(resp) => return resp,
    };
    tx_response(data.caller.register_proving_key(fee, body.provider_pays_gas).await)
}

async fn change_fee(data: web::Data<AppState>, body: web::Json<ChangeFeeRequest>) -> HttpResponse {
    let fee = match parse_amount(&body.amount) {
        Ok(fee) => fee,
        Err(resp) => return resp,
    };
    tx_response(data.caller.change_fee(fee).await)
}

async fn set_provider_pays_gas(
    data: web::Data<AppState>,
    body: web::Json<SetProviderPaysGasRequest>,
) -> HttpResponse {
    tx_response(data.caller.set_provider_pays_gas(body.provider_pays).await)
}

async fn top_up_gas(data: web::Data<AppState>, body: web::Json<TopUpGasRequest>) -> HttpResponse {
    let amount = match parse_amount(&body.amount) {
        Ok(amount) => amount,
        Err(resp) => return resp,
    };
    tx_response(data.caller.top_up_gas(amount).await)
}

async fn request_randomness(
    data: web::Data<AppState>,
    body: web::Json<RandomnessRequestBody>,
) -> HttpResponse {
    let (seed, fee) = match (parse_amount(&body.seed), parse_amount(&body.fee)) {
        (Ok(seed), Ok(fee)) => (seed, fee),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    tx_response(data.caller.randomness_request(body.key_hash, seed, fee).await)
}

async fn last_request(data: web::Data<AppState>) -> HttpResponse {
    match data.ledger.last() {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => HttpResponse::NotFound().json(error_json("no requests recorded")),
        Err(e) => HttpResponse::InternalServerError().json(error_json(e)),
    }
}

async fn get_request(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let Ok(request_id) = B256::from_str(path.as_str()) else {
        return HttpResponse::BadRequest().json(error_json("request id must be 32 bytes of hex"));
    };
    match data.ledger.get(&request_id) {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => HttpResponse::NotFound().json(error_json("unknown request")),
        Err(e) => HttpResponse::InternalServerError().json(error_json(e)),
    }
}
