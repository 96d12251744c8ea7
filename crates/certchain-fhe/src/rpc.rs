use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use certchain_core::eip712::TypedDataRequest;
use certchain_core::wire::{JsonRpcRequest, JsonRpcResponse};
use certchain_core::{ConfidentialError, ConfidentialResult, IdentitySigner, NetworkTransport, SignError};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

// ---------------------------------------------------------------------------
// HttpTransport: JSON-RPC over HTTP
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ConfidentialResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfidentialError::Transport(format!("http client init failed: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NetworkTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> ConfidentialResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(id, method, params);
        tracing::debug!(url = %self.url, method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConfidentialError::Transport(format!("{} {}: {}", method, self.url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConfidentialError::Transport(format!(
                "{} {}: http status {}",
                method, self.url, status
            )));
        }
        let envelope: JsonRpcResponse = response.json().await.map_err(|e| {
            ConfidentialError::Transport(format!("{}: malformed json-rpc response: {}", method, e))
        })?;

        if let Some(err) = envelope.error {
            return Err(ConfidentialError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Whether a URL points at this machine.
///
/// Parsed hosts are compared against `localhost` and loopback addresses. A
/// URL without a recognizable host falls back to a textual match.
pub fn is_loopback_url(url: &str) -> bool {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    match host {
        Some(host) => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            host.eq_ignore_ascii_case("localhost")
                || host
                    .parse::<IpAddr>()
                    .map(|ip| ip.is_loopback())
                    .unwrap_or(false)
        }
        None => url.contains("localhost") || url.contains("127.0.0.1"),
    }
}

// ---------------------------------------------------------------------------
// WalletSigner: delegates typed-data signing to the node's account manager
// ---------------------------------------------------------------------------

pub struct WalletSigner {
    transport: Arc<dyn NetworkTransport>,
    address: Address,
}

impl WalletSigner {
    pub fn new(transport: Arc<dyn NetworkTransport>, address: Address) -> Self {
        Self { transport, address }
    }

    /// Use the first account the node manages.
    pub async fn first_account(transport: Arc<dyn NetworkTransport>) -> ConfidentialResult<Self> {
        let accounts = transport.request("eth_accounts", json!([])).await?;
        let address = accounts
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConfidentialError::Signing("node exposes no accounts".into()))?
            .parse::<Address>()
            .map_err(|e| ConfidentialError::Signing(format!("bad account address: {}", e)))?;
        Ok(Self::new(transport, address))
    }
}

#[async_trait]
impl IdentitySigner for WalletSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, request: &TypedDataRequest) -> Result<Bytes, SignError> {
        let payload = request.json.to_string();
        let result = self
            .transport
            .request(
                "eth_signTypedData_v4",
                json!([self.address.to_string(), payload]),
            )
            .await;
        let value = match result {
            Ok(v) => v,
            Err(ConfidentialError::Rpc { code, .. }) if code == USER_REJECTED_CODE => {
                tracing::info!(account = %self.address, "typed-data signature declined");
                return Err(SignError::Declined);
            }
            Err(e) => return Err(SignError::Failed(e.to_string())),
        };

        let hex_sig = value
            .as_str()
            .ok_or_else(|| SignError::Failed("signature is not a string".into()))?;
        let raw = hex::decode(hex_sig.trim_start_matches("0x"))
            .map_err(|e| SignError::Failed(format!("signature is not hex: {}", e)))?;
        if raw.len() != 65 {
            return Err(SignError::Failed(format!(
                "signature has {} bytes, expected 65",
                raw.len()
            )));
        }
        Ok(Bytes::from(raw))
    }
}
