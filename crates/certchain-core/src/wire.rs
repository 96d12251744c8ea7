//! JSON bodies exchanged with the relayer and the developer node, plus the
//! binary payloads sealed inside them.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::handle::CiphertextHandle;
use crate::types::{FheType, HandleContractPair, InputField};

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.to_string(),
            params: Some(params),
            id: serde_json::Value::from(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A `null` result deserializes as `None`; callers treat both alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: serde_json::Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

pub const RPC_METHOD_NOT_FOUND: i64 = -32601;
pub const RPC_INVALID_PARAMS: i64 = -32602;
pub const RPC_EXECUTION_ERROR: i64 = -32000;
/// The caller may not read the requested state.
pub const RPC_ACCESS_DENIED: i64 = -32003;

// ---------------------------------------------------------------------------
// Relayer bodies
// ---------------------------------------------------------------------------

/// Every relayer response is wrapped in `{"response": …}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerEnvelope<T> {
    pub response: T,
}

/// `GET /v1/keyurl`: key that input blobs are sealed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputKeyInfo {
    pub key_id: String,
    pub public_key: Bytes,
}

/// `POST /v1/input-proof`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub ciphertext_with_input_verification: Bytes,
    pub contract_chain_id: String,
    pub extra_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProofResponse {
    pub handles: Vec<CiphertextHandle>,
    pub signatures: Vec<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPairWire {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
}

impl From<&HandleContractPair> for HandleContractPairWire {
    fn from(p: &HandleContractPair) -> Self {
        Self {
            handle: p.handle,
            contract_address: p.contract,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidity {
    pub start_timestamp: String,
    pub duration_days: String,
}

/// `POST /v1/user-decrypt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequest {
    pub handle_contract_pairs: Vec<HandleContractPairWire>,
    pub request_validity: RequestValidity,
    pub contracts_chain_id: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub signature: Bytes,
    pub public_key: Bytes,
    pub extra_data: Bytes,
}

/// One decryption share, sealed to the grant's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptShare {
    pub payload: Bytes,
    pub signature: Bytes,
}

/// `fhevm_relayer_metadata` on a developer node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}

// ---------------------------------------------------------------------------
// Binary payloads
// ---------------------------------------------------------------------------

/// Packed plaintext fields: `[n u8]` then `n × ([type id u8][word 32B])`.
pub fn encode_packed_inputs(fields: &[InputField]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + fields.len() * 33);
    out.push(fields.len() as u8);
    for f in fields {
        out.push(f.fhe_type.id());
        out.extend_from_slice(f.value.to_word().as_slice());
    }
    out
}

pub fn decode_packed_inputs(bytes: &[u8]) -> Result<Vec<(FheType, B256)>, String> {
    let (count, body) = bytes
        .split_first()
        .ok_or_else(|| "empty input payload".to_string())?;
    let count = *count as usize;
    if body.len() != count * 33 {
        return Err(format!(
            "input payload length {} does not match {} fields",
            body.len(),
            count
        ));
    }
    body.chunks_exact(33)
        .map(|chunk| {
            let ty = FheType::from_id(chunk[0])
                .ok_or_else(|| format!("unknown fhe type id {}", chunk[0]))?;
            Ok((ty, B256::from_slice(&chunk[1..])))
        })
        .collect()
}

/// Decrypted share contents: `n × ([handle 32B][word 32B])`.
pub fn encode_decrypted_payload(entries: &[(CiphertextHandle, B256)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 64);
    for (h, w) in entries {
        out.extend_from_slice(h.0.as_slice());
        out.extend_from_slice(w.as_slice());
    }
    out
}

pub fn decode_decrypted_payload(bytes: &[u8]) -> Result<Vec<(CiphertextHandle, B256)>, String> {
    if bytes.len() % 64 != 0 {
        return Err(format!("decrypted payload length {} is not a multiple of 64", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(64)
        .map(|c| {
            (
                CiphertextHandle(B256::from_slice(&c[..32])),
                B256::from_slice(&c[32..]),
            )
        })
        .collect())
}

/// Associated data binding a sealed input blob to its (contract, user, chain).
pub fn input_seal_aad(contract: Address, user: Address, chain_id: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(48);
    aad.extend_from_slice(contract.as_slice());
    aad.extend_from_slice(user.as_slice());
    aad.extend_from_slice(&chain_id.to_be_bytes());
    aad
}

/// Associated data binding a decryption share to the grant's user.
pub fn share_seal_aad(user: Address) -> Vec<u8> {
    user.as_slice().to_vec()
}
