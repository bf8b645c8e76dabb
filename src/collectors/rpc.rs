//! Minimal JSON-RPC 2.0 transport shared by the EVM, Bitcoin and
//! Solana collectors.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// The node answered with a JSON-RPC `error` member.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("RPC {method} error {code}: {message}")]
pub struct RpcNodeError {
    pub method: String,
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// A JSON-RPC endpoint with its own HTTP client and request counter.
pub struct JsonRpcClient {
    http: Client,
    url: String,
    basic_auth: Option<(String, SecretString)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("CHAINWATCH/0.1.0")
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            url: url.to_string(),
            basic_auth: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Attach HTTP basic-auth credentials (Bitcoin Core style).
    pub fn with_basic_auth(mut self, credentials: Option<(String, SecretString)>) -> Self {
        self.basic_auth = credentials;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke `method` and deserialize its `result` member.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(url = %self.url, method, id, "RPC call");

        let mut req = self.http.post(&self.url).json(&body);
        if let Some((user, password)) = &self.basic_auth {
            req = req.basic_auth(user, Some(password.expose_secret()));
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("RPC request {method} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("RPC {method} returned HTTP {status}: {text}");
        }

        let envelope: RpcEnvelope = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse RPC response for {method}"))?;

        if let Some(err) = envelope.error {
            return Err(RpcNodeError {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            }
            .into());
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .with_context(|| format!("Unexpected result shape for {method}"))
    }
}

/// Parse an `0x`-prefixed hex quantity (EVM style).
pub fn parse_hex_u64(raw: &str) -> Result<u64> {
    let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: {raw}"))
}

/// Parse a hex quantity that may exceed `u64` (wei amounts) into `f64`.
pub fn parse_hex_f64(raw: &str) -> Result<f64> {
    let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0.0);
    }
    u128::from_str_radix(digits, 16)
        .map(|v| v as f64)
        .with_context(|| format!("Invalid hex quantity: {raw}"))
}
