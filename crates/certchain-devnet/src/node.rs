use alloy_primitives::{address, Address};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use certchain_core::wire::{
    HandleContractPairWire, JsonRpcRequest, JsonRpcResponse, RelayerMetadata, RPC_ACCESS_DENIED,
    RPC_INVALID_PARAMS, RPC_METHOD_NOT_FOUND,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::store::CleartextStore;

pub const DEV_CHAIN_ID: u64 = 31337;
pub const DEV_CLIENT_VERSION: &str = "HardhatNetwork/2.22.10/@nomicfoundation/edr/0.5.2";
pub const FOREIGN_CLIENT_VERSION: &str = "Geth/v1.14.8-stable/linux-amd64/go1.22.6";

/// First funded account of the developer chain.
pub const DEV_ACCOUNT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

pub const DEV_ACL: Address = address!("339ece85b9e11a3a3aa557582784a15d7f82aaf2");
pub const DEV_INPUT_VERIFIER: Address = address!("3a1d4e5c26cd16fa4d3ba58e6f6c0ee0b8d4f2a5");
pub const DEV_KMS_VERIFIER: Address = address!("208de73316e44722e16f6ddff40881a3e4f86104");

/// How the node answers. Anything but `Healthy` must make local probing
/// fall through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeBehavior {
    #[default]
    Healthy,
    /// Answers like a node that is not a developer chain.
    WrongMarker,
    /// Returns bodies that are not valid JSON.
    MalformedJson,
    /// Accepts the request and never answers within any sane timeout.
    Hang,
}

/// How long a [`NodeBehavior::Hang`] node sits on a request.
pub const HANG_FOR: Duration = Duration::from_secs(30);

struct NodeState {
    behavior: NodeBehavior,
    chain_id: u64,
    store: CleartextStore,
    requests: AtomicUsize,
}

/// JSON-RPC developer node backed by a [`CleartextStore`].
#[derive(Clone)]
pub struct DevNode {
    state: Arc<NodeState>,
}

impl DevNode {
    pub fn new(store: CleartextStore) -> Self {
        Self::with_behavior(store, NodeBehavior::Healthy)
    }

    pub fn with_behavior(store: CleartextStore, behavior: NodeBehavior) -> Self {
        Self::on_chain(store, behavior, DEV_CHAIN_ID)
    }

    pub fn on_chain(store: CleartextStore, behavior: NodeBehavior, chain_id: u64) -> Self {
        Self {
            state: Arc::new(NodeState {
                behavior,
                chain_id,
                store,
                requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn metadata() -> RelayerMetadata {
        RelayerMetadata {
            acl_address: DEV_ACL,
            input_verifier_address: DEV_INPUT_VERIFIER,
            kms_verifier_address: DEV_KMS_VERIFIER,
        }
    }

    pub fn store(&self) -> &CleartextStore {
        &self.state.store
    }

    /// JSON-RPC requests received so far, of any method.
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .with_state(self.state.clone())
    }
}

/// POST / -- JSON-RPC dispatch
async fn handle_rpc(State(state): State<Arc<NodeState>>, Json(request): Json<JsonRpcRequest>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(method = %request.method, "dev node request");

    if state.behavior == NodeBehavior::Hang {
        tokio::time::sleep(HANG_FOR).await;
    }
    if state.behavior == NodeBehavior::MalformedJson {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            "{\"jsonrpc\":\"2.0\",\"result\":",
        )
            .into_response();
    }

    let params = request.params.clone().unwrap_or(Value::Null);
    let outcome = match request.method.as_str() {
        "web3_clientVersion" => Ok(json!(match state.behavior {
            NodeBehavior::WrongMarker => FOREIGN_CLIENT_VERSION,
            _ => DEV_CLIENT_VERSION,
        })),
        "eth_chainId" => Ok(json!(format!("{:#x}", state.chain_id))),
        "eth_accounts" => Ok(json!([DEV_ACCOUNT])),
        "fhevm_relayer_metadata" if state.behavior == NodeBehavior::Healthy => {
            Ok(json!(DevNode::metadata()))
        }
        "fhevm_getClearText" if state.behavior == NodeBehavior::Healthy => {
            clear_text(&state.store, &params)
        }
        other => Err((RPC_METHOD_NOT_FOUND, format!("method {} not found", other))),
    };

    let response = match outcome {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err((code, message)) => JsonRpcResponse::error(request.id, code, message),
    };
    Json(response).into_response()
}

/// `params = [[{handle, contractAddress}, ...], user]`; one hex word or
/// `null` per pair. Every pair must be readable by both `user` and its
/// contract or the whole request is refused.
fn clear_text(store: &CleartextStore, params: &Value) -> Result<Value, (i64, String)> {
    let invalid = |what: String| (RPC_INVALID_PARAMS, what);
    let pairs: Vec<HandleContractPairWire> = params
        .get(0)
        .cloned()
        .ok_or_else(|| invalid("expected [[{handle, contractAddress}, ...], user]".into()))
        .and_then(|v| serde_json::from_value(v).map_err(|e| invalid(format!("pairs: {}", e))))?;
    let user: Address = params
        .get(1)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("missing or invalid user address".into()))?;

    for pair in &pairs {
        for account in [user, pair.contract_address] {
            if !store.is_allowed(&pair.handle, &account) {
                tracing::debug!(handle = %pair.handle, account = %account, "cleartext read refused");
                return Err((
                    RPC_ACCESS_DENIED,
                    format!("{} may not decrypt {}", account, pair.handle),
                ));
            }
        }
    }

    Ok(Value::Array(
        pairs
            .iter()
            .map(|pair| match store.get(&pair.handle) {
                Some(word) => json!(word),
                None => Value::Null,
            })
            .collect(),
    ))
}
