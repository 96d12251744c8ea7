use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::eip712::TypedDataRequest;
use crate::error::{ConfidentialError, ConfidentialResult};
use crate::types::{CredentialId, CredentialRecord, CredentialSubmission, IssuedCredential};

// ---------------------------------------------------------------------------
// NetworkTransport: JSON-RPC access to a chain node
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> ConfidentialResult<Value>;

    async fn chain_id(&self) -> ConfidentialResult<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&value)
    }

    /// Human-readable target used for logging and `NetworkContext::rpc_target`.
    fn describe(&self) -> String;
}

/// Parse an Ethereum quantity, either `"0x…"` hex or a JSON number.
pub fn parse_quantity(value: &Value) -> ConfidentialResult<u64> {
    match value {
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .ok_or_else(|| ConfidentialError::Transport(format!("not a hex quantity: {s}")))?;
            u64::from_str_radix(digits, 16)
                .map_err(|e| ConfidentialError::Transport(format!("bad quantity {s}: {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ConfidentialError::Transport(format!("bad quantity {n}"))),
        other => Err(ConfidentialError::Transport(format!(
            "expected quantity, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// IdentitySigner: the account that authorizes grants and submits inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("signature request declined")]
    Declined,

    #[error("signing failed: {0}")]
    Failed(String),
}

impl From<SignError> for ConfidentialError {
    fn from(e: SignError) -> Self {
        match e {
            SignError::Declined => ConfidentialError::UserDeclinedAuthorization,
            SignError::Failed(msg) => ConfidentialError::Signing(msg),
        }
    }
}

#[async_trait]
pub trait IdentitySigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign exactly the given typed-data structure, returning a 65-byte
    /// recoverable signature.
    async fn sign_typed_data(&self, request: &TypedDataRequest) -> Result<Bytes, SignError>;
}

// ---------------------------------------------------------------------------
// CredentialLedger: the registry contract surface
//
// The ledger verifies input proofs against the transaction sender, stores
// handles, and computes the revocation handle itself. Encryption and
// decryption never go through it.
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CredentialLedger: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn submit_credential(
        &self,
        id: CredentialId,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential>;

    /// Let the ledger choose the identifier.
    async fn submit_credential_auto(
        &self,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential>;

    async fn get_credential(&self, id: CredentialId) -> ConfidentialResult<Option<CredentialRecord>>;

    async fn set_revoked(&self, id: CredentialId, reason: &str) -> ConfidentialResult<B256>;

    async fn clear_revoked(&self, id: CredentialId) -> ConfidentialResult<B256>;

    async fn is_issuer(&self, account: Address) -> ConfidentialResult<bool>;

    async fn register_issuer(&self, name: &str, metadata_uri: &str) -> ConfidentialResult<B256>;

    /// Identifiers of every credential issued to `recipient`, oldest first.
    async fn issued_to(&self, recipient: Address) -> ConfidentialResult<Vec<CredentialId>>;
}
