//! Soroban RPC client (JSON-RPC 2.0 over HTTP).
//!
//! Methods used: `getHealth`, `getLatestLedger`, `simulateTransaction`,
//! `sendTransaction`, `getTransaction`.
//!
//! Docs: https://developers.stellar.org/docs/data/apis/rpc/api-reference/methods

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use stellar_xdr::curr::{
    Limits, ReadXdr, ScVal, SorobanAuthorizationEntry, SorobanTransactionData, TransactionMeta,
};
use tracing::{debug, warn};

use crate::types::MissionError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between `getTransaction` polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestLedger {
    pub id: String,
    pub protocol_version: u32,
    pub sequence: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    #[serde(default)]
    transaction_data: Option<String>,
    #[serde(default)]
    min_resource_fee: Option<String>,
    #[serde(default)]
    results: Vec<SimulateHostFunctionResult>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    latest_ledger: u32,
}

#[derive(Debug, Deserialize)]
struct SimulateHostFunctionResult {
    #[serde(default)]
    auth: Vec<String>,
    xdr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    status: String,
    hash: String,
    #[serde(default)]
    error_result_xdr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTransactionResponse {
    status: String,
    #[serde(default)]
    ledger: Option<u32>,
    #[serde(default)]
    return_value: Option<String>,
    #[serde(default)]
    result_meta_xdr: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoded results
// ---------------------------------------------------------------------------

/// What `simulateTransaction` reported, with the XDR already decoded.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    pub transaction_data: Option<SorobanTransactionData>,
    pub min_resource_fee: u64,
    pub auth: Vec<SorobanAuthorizationEntry>,
    /// Return value of the invoked function.
    pub result: Option<ScVal>,
    /// Host diagnostic when the invocation failed.
    pub error: Option<String>,
    pub latest_ledger: u32,
}

impl SimulateResponse {
    fn decode(self) -> Result<SimulationOutcome, MissionError> {
        let transaction_data = self
            .transaction_data
            .filter(|d| !d.is_empty())
            .map(|d| SorobanTransactionData::from_xdr_base64(d, Limits::none()))
            .transpose()?;
        let min_resource_fee = match self.min_resource_fee.as_deref() {
            Some(fee) => fee
                .parse()
                .map_err(|_| MissionError::Decode(format!("minResourceFee {fee}")))?,
            None => 0,
        };

        let (auth, result) = match self.results.into_iter().next() {
            Some(first) => {
                let auth = first
                    .auth
                    .iter()
                    .map(|a| SorobanAuthorizationEntry::from_xdr_base64(a, Limits::none()))
                    .collect::<Result<Vec<_>, _>>()?;
                (auth, Some(ScVal::from_xdr_base64(&first.xdr, Limits::none())?))
            }
            None => (Vec::new(), None),
        };

        Ok(SimulationOutcome {
            transaction_data,
            min_resource_fee,
            auth,
            result,
            error: self.error,
            latest_ledger: self.latest_ledger,
        })
    }
}

/// `sendTransaction` outcome. `Pending` and `Duplicate` mean the
/// transaction was accepted for inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error(Option<String>),
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub hash: String,
    pub status: SendStatus,
}

impl SendResponse {
    fn decode(self) -> SendOutcome {
        let status = match self.status.as_str() {
            "PENDING" => SendStatus::Pending,
            "DUPLICATE" => SendStatus::Duplicate,
            "TRY_AGAIN_LATER" => SendStatus::TryAgainLater,
            _ => SendStatus::Error(self.error_result_xdr),
        };
        SendOutcome {
            hash: self.hash,
            status,
        }
    }
}

/// `getTransaction` outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionStatus {
    NotFound,
    Success {
        ledger: Option<u32>,
        return_value: Option<ScVal>,
    },
    Failed {
        ledger: Option<u32>,
    },
}

impl GetTransactionResponse {
    fn decode(self) -> Result<TransactionStatus, MissionError> {
        match self.status.as_str() {
            "SUCCESS" => {
                let return_value = match (self.return_value, self.result_meta_xdr) {
                    (Some(rv), _) => Some(ScVal::from_xdr_base64(rv, Limits::none())?),
                    (None, Some(meta)) => {
                        match TransactionMeta::from_xdr_base64(meta, Limits::none())? {
                            TransactionMeta::V3(v3) => v3.soroban_meta.map(|m| m.return_value),
                            _ => None,
                        }
                    }
                    (None, None) => None,
                };
                Ok(TransactionStatus::Success {
                    ledger: self.ledger,
                    return_value,
                })
            }
            "FAILED" => Ok(TransactionStatus::Failed {
                ledger: self.ledger,
            }),
            "NOT_FOUND" => Ok(TransactionStatus::NotFound),
            other => Err(MissionError::Decode(format!(
                "unknown transaction status {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Soroban RPC client.
pub struct SorobanRpc {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl SorobanRpc {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("kale-missions/0.1")
            .build()
            .context("Failed to build HTTP client for Soroban RPC")?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "Soroban RPC request");

        let resp = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Soroban RPC {method} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Soroban RPC {method} returned {status}: {body}");
        }

        let body: RpcResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Soroban RPC {method} response"))?;
        unwrap_response(body)
    }

    pub async fn health(&self) -> Result<String> {
        let resp: HealthResponse = self.call("getHealth", json!({})).await?;
        Ok(resp.status)
    }

    pub async fn latest_ledger(&self) -> Result<LatestLedger> {
        self.call("getLatestLedger", json!({})).await
    }

    /// Simulate a base64 transaction envelope.
    pub async fn simulate(&self, envelope_xdr: &str) -> Result<SimulationOutcome> {
        let resp: SimulateResponse = self
            .call("simulateTransaction", json!({ "transaction": envelope_xdr }))
            .await?;
        Ok(resp.decode()?)
    }

    /// Submit a signed base64 transaction envelope.
    pub async fn send(&self, envelope_xdr: &str) -> Result<SendOutcome> {
        let resp: SendResponse = self
            .call("sendTransaction", json!({ "transaction": envelope_xdr }))
            .await?;
        Ok(resp.decode())
    }

    pub async fn transaction(&self, hash: &str) -> Result<TransactionStatus> {
        let resp: GetTransactionResponse =
            self.call("getTransaction", json!({ "hash": hash })).await?;
        Ok(resp.decode()?)
    }

    /// Poll `getTransaction` until the transaction leaves `NOT_FOUND`.
    pub async fn wait_for_transaction(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> Result<TransactionStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.transaction(hash).await {
                Ok(TransactionStatus::NotFound) => {}
                Ok(status) => return Ok(status),
                Err(e) => warn!(hash, error = %e, "getTransaction failed, retrying"),
            }
            if tokio::time::Instant::now() >= deadline {
                bail!(MissionError::Transaction {
                    hash: hash.to_string(),
                    status: "TIMEOUT".into(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn unwrap_response<T>(body: RpcResponse<T>) -> Result<T> {
    if let Some(err) = body.error {
        return Err(MissionError::Rpc {
            code: err.code,
            message: err.message,
        }
        .into());
    }
    body.result.context("Soroban RPC response had neither result nor error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
