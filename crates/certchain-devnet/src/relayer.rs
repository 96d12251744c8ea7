use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolStruct;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use certchain_core::eip712::{
    decryption_domain, input_verification_domain, CiphertextVerification,
    UserDecryptRequestVerification,
};
use certchain_core::seal::{open, seal};
use certchain_core::wire::{
    decode_packed_inputs, encode_decrypted_payload, input_seal_aad, share_seal_aad, InputKeyInfo,
    InputProofRequest, InputProofResponse, RelayerEnvelope, UserDecryptRequest, UserDecryptShare,
};
use certchain_core::{
    address_from_verifying_key, derive_input_handles, sign_hash, signer_matches, CiphertextHandle,
    FheType, Timestamp,
};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::store::CleartextStore;

pub const INPUT_KEY_ID: &str = "devnet-input-key";

/// The deployment a mock relayer pretends to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerProfile {
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub acl_address: Address,
    pub verifying_contract_decryption: Address,
    pub verifying_contract_input_verification: Address,
    /// Decryption shares returned per request.
    pub share_count: usize,
}

struct RelayerState {
    profile: RelayerProfile,
    store: CleartextStore,
    input_key: SecretKey,
    coprocessor: SigningKey,
    input_proofs: AtomicUsize,
    user_decrypts: AtomicUsize,
}

/// Relayer with throwaway keys. Inputs are opened with its input key and
/// their plaintext lands in the shared store; decryption answers are sealed
/// to the requesting grant's public key.
#[derive(Clone)]
pub struct MockRelayer {
    state: Arc<RelayerState>,
}

impl MockRelayer {
    pub fn new(store: CleartextStore, profile: RelayerProfile) -> Self {
        Self {
            state: Arc::new(RelayerState {
                profile,
                store,
                input_key: SecretKey::random(&mut rand::rngs::OsRng),
                coprocessor: SigningKey::random(&mut rand::rngs::OsRng),
                input_proofs: AtomicUsize::new(0),
                user_decrypts: AtomicUsize::new(0),
            }),
        }
    }

    pub fn profile(&self) -> &RelayerProfile {
        &self.state.profile
    }

    /// Address a registry should accept input attestations from.
    pub fn coprocessor_address(&self) -> Address {
        address_from_verifying_key(self.state.coprocessor.verifying_key())
    }

    pub fn input_proof_count(&self) -> usize {
        self.state.input_proofs.load(Ordering::SeqCst)
    }

    pub fn user_decrypt_count(&self) -> usize {
        self.state.user_decrypts.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/keyurl", get(handle_keyurl))
            .route("/v1/input-proof", post(handle_input_proof))
            .route("/v1/user-decrypt", post(handle_user_decrypt))
            .with_state(self.state.clone())
    }
}

type Rejection = (StatusCode, String);

fn reject(message: impl Into<String>) -> Rejection {
    (StatusCode::BAD_REQUEST, message.into())
}

fn respond<T: Serialize>(result: Result<T, Rejection>) -> Response {
    match result {
        Ok(response) => Json(RelayerEnvelope { response }).into_response(),
        Err((status, message)) => {
            tracing::debug!(%status, %message, "mock relayer rejected request");
            (status, Json(json!({ "message": message }))).into_response()
        }
    }
}

/// GET /v1/keyurl -- input sealing key
async fn handle_keyurl(State(state): State<Arc<RelayerState>>) -> Response {
    let public = state.input_key.public_key().to_encoded_point(true);
    respond(Ok(InputKeyInfo {
        key_id: INPUT_KEY_ID.to_string(),
        public_key: Bytes::copy_from_slice(public.as_bytes()),
    }))
}

/// POST /v1/input-proof -- open, register and attest an input blob
async fn handle_input_proof(
    State(state): State<Arc<RelayerState>>,
    Json(request): Json<InputProofRequest>,
) -> Response {
    state.input_proofs.fetch_add(1, Ordering::SeqCst);
    respond(input_proof(&state, request))
}

fn input_proof(state: &RelayerState, request: InputProofRequest) -> Result<InputProofResponse, Rejection> {
    let profile = &state.profile;
    let chain_id = parse_chain_id(&request.contract_chain_id)?;
    if chain_id != profile.chain_id {
        return Err(reject(format!(
            "contract chain {} is not served here ({})",
            chain_id, profile.chain_id
        )));
    }

    let blob = &request.ciphertext_with_input_verification;
    let aad = input_seal_aad(request.contract_address, request.user_address, chain_id);
    let packed = open(&state.input_key, blob, &aad).map_err(|e| reject(format!("sealed input: {}", e)))?;
    let fields = decode_packed_inputs(&packed).map_err(reject)?;
    if fields.is_empty() {
        return Err(reject("input has no fields"));
    }

    let types: Vec<FheType> = fields.iter().map(|(ty, _)| *ty).collect();
    let handles = derive_input_handles(blob, profile.acl_address, chain_id, &types);
    for (handle, (_, word)) in handles.iter().zip(&fields) {
        state.store.insert(*handle, *word);
    }

    let attestation = CiphertextVerification::new(
        &handles,
        request.user_address,
        request.contract_address,
        chain_id,
        request.extra_data.clone(),
    );
    let domain = input_verification_domain(
        profile.gateway_chain_id,
        profile.verifying_contract_input_verification,
    );
    let signature = sign_hash(&state.coprocessor, &attestation.eip712_signing_hash(&domain))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::debug!(contract = %request.contract_address, handles = handles.len(), "input attested");
    Ok(InputProofResponse {
        handles,
        signatures: vec![Bytes::copy_from_slice(&signature)],
    })
}

/// POST /v1/user-decrypt -- check the grant, answer with sealed shares
async fn handle_user_decrypt(
    State(state): State<Arc<RelayerState>>,
    Json(request): Json<UserDecryptRequest>,
) -> Response {
    state.user_decrypts.fetch_add(1, Ordering::SeqCst);
    respond(user_decrypt(&state, request))
}

fn user_decrypt(state: &RelayerState, request: UserDecryptRequest) -> Result<Vec<UserDecryptShare>, Rejection> {
    let profile = &state.profile;
    let unauthorized = |m: String| (StatusCode::FORBIDDEN, m);

    let chain_id = parse_chain_id(&request.contracts_chain_id)?;
    if chain_id != profile.chain_id {
        return Err(reject(format!("contracts chain {} is not served here", chain_id)));
    }
    let start: u64 = request
        .request_validity
        .start_timestamp
        .parse()
        .map_err(|_| reject("invalid startTimestamp"))?;
    let days: u32 = request
        .request_validity
        .duration_days
        .parse()
        .map_err(|_| reject("invalid durationDays"))?;

    let message = UserDecryptRequestVerification::new(
        &request.public_key,
        &request.contract_addresses,
        start,
        days,
    );
    let domain = decryption_domain(profile.gateway_chain_id, profile.verifying_contract_decryption);
    if !signer_matches(&message.eip712_signing_hash(&domain), &request.signature, request.user_address) {
        return Err(unauthorized("signature does not match user".into()));
    }
    let now = Timestamp::now().seconds_since_epoch;
    if now >= Timestamp::from_seconds(start).plus_days(days).seconds_since_epoch {
        return Err(unauthorized("decryption request has expired".into()));
    }

    let allowed: HashSet<Address> = request.contract_addresses.iter().copied().collect();
    let mut entries: Vec<(CiphertextHandle, B256)> = Vec::with_capacity(request.handle_contract_pairs.len());
    for pair in &request.handle_contract_pairs {
        if !allowed.contains(&pair.contract_address) {
            return Err(unauthorized(format!(
                "contract {} is not covered by the request",
                pair.contract_address
            )));
        }
        if !state.store.is_allowed(&pair.handle, &request.user_address) {
            return Err(unauthorized(format!(
                "{} may not decrypt {}",
                request.user_address, pair.handle
            )));
        }
        let word = state
            .store
            .get(&pair.handle)
            .ok_or_else(|| reject(format!("unknown handle {}", pair.handle)))?;
        entries.push((pair.handle, word));
    }

    let payload = encode_decrypted_payload(&entries);
    let aad = share_seal_aad(request.user_address);
    (0..profile.share_count.max(1))
        .map(|_| {
            let sealed = seal(&request.public_key, &payload, &aad)
                .map_err(|e| reject(format!("public key: {}", e)))?;
            let signature = sign_hash(&state.coprocessor, &keccak256(&sealed))
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            Ok(UserDecryptShare {
                payload: Bytes::from(sealed),
                signature: Bytes::copy_from_slice(&signature),
            })
        })
        .collect()
}

/// Chain ids arrive as decimal or `0x` hex strings.
fn parse_chain_id(raw: &str) -> Result<u64, Rejection> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| reject(format!("invalid chain id {:?}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn profile() -> RelayerProfile {
        RelayerProfile {
            chain_id: 11155111,
            gateway_chain_id: 55815,
            acl_address: Address::repeat_byte(0xac),
            verifying_contract_decryption: Address::repeat_byte(0xde),
            verifying_contract_input_verification: Address::repeat_byte(0x1f),
            share_count: 2,
        }
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0xaa36a7").unwrap(), 11155111);
        assert_eq!(parse_chain_id("11155111").unwrap(), 11155111);
        assert!(parse_chain_id("sepolia").is_err());
    }

    #[tokio::test]
    async fn test_keyurl_publishes_compressed_key() {
        let relayer = MockRelayer::new(CleartextStore::new(), profile());
        let response = relayer
            .router()
            .oneshot(Request::get("/v1/keyurl").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: RelayerEnvelope<InputKeyInfo> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.response.key_id, INPUT_KEY_ID);
        assert_eq!(envelope.response.public_key.len(), 33);
    }

    #[tokio::test]
    async fn test_input_proof_rejects_garbage() {
        let relayer = MockRelayer::new(CleartextStore::new(), profile());
        let request = InputProofRequest {
            contract_address: Address::repeat_byte(1),
            user_address: Address::repeat_byte(2),
            ciphertext_with_input_verification: Bytes::from(vec![0u8; 80]),
            contract_chain_id: "0xaa36a7".into(),
            extra_data: Bytes::from(vec![0u8]),
        };
        let response = relayer
            .router()
            .oneshot(
                Request::post("/v1/input-proof")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&request).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(relayer.input_proof_count(), 1);
    }

    #[test]
    fn test_input_proof_registers_cleartexts() {
        let store = CleartextStore::new();
        let relayer = MockRelayer::new(store.clone(), profile());
        let contract = Address::repeat_byte(1);
        let user = Address::repeat_byte(2);
        let packed = certchain_core::wire::encode_packed_inputs(&[certchain_core::InputField::uint32(7)]);
        let public = relayer.state.input_key.public_key().to_encoded_point(true);
        let sealed = seal(public.as_bytes(), &packed, &input_seal_aad(contract, user, 11155111)).unwrap();

        let response = input_proof(
            &relayer.state,
            InputProofRequest {
                contract_address: contract,
                user_address: user,
                ciphertext_with_input_verification: Bytes::from(sealed),
                contract_chain_id: "0xaa36a7".into(),
                extra_data: Bytes::from(vec![0u8]),
            },
        )
        .unwrap();
        assert_eq!(response.handles.len(), 1);
        assert_eq!(response.handles[0].fhe_type(), Some(FheType::Uint32));
        assert_eq!(store.get(&response.handles[0]), Some(B256::with_last_byte(7)));
    }
}
