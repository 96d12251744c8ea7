//! Shared fixtures: a simulated developer network and a mock public
//! deployment, each with a proof-verifying registry.
#![allow(dead_code)]

use async_trait::async_trait;
use certchain_core::eip712::{input_verification_domain, TypedDataRequest};
use certchain_core::{
    address_from_verifying_key, Address, Bytes, CredentialId, CredentialLedger, IdentitySigner,
    InputField, LocalKeySigner, SignError,
};
use certchain_devnet::{
    spawn, unreachable_url, CleartextStore, DevNode, InMemoryRegistry, MockRelayer, NodeBehavior,
    RelayerProfile,
};
use certchain_fhe::{input, BackendConfig, EncryptionBackend, LocalNodeConfig, RelayerConfig};
use k256::ecdsa::SigningKey;
use std::sync::Arc;

pub const REGISTRY: Address = Address::repeat_byte(0xc0);
pub const HOLDER: Address = Address::repeat_byte(0x40);

pub struct LocalNet {
    pub store: CleartextStore,
    pub node: DevNode,
    pub node_url: String,
    pub config: BackendConfig,
    pub registry: InMemoryRegistry,
}

pub async fn local_net_with(behavior: NodeBehavior) -> LocalNet {
    let store = CleartextStore::new();
    let node = DevNode::with_behavior(store.clone(), behavior);
    let node_url = spawn(node.router()).await.unwrap();

    let local = LocalNodeConfig {
        url: node_url.clone(),
        ..LocalNodeConfig::default()
    };
    let coprocessor = SigningKey::from_slice(
        &hex::decode(local.coprocessor_key.trim_start_matches("0x")).unwrap(),
    )
    .unwrap();
    let registry = InMemoryRegistry::new(
        REGISTRY,
        local.chain_id,
        input_verification_domain(local.gateway_chain_id, local.verifying_contract_input_verification),
        vec![address_from_verifying_key(coprocessor.verifying_key())],
        store.clone(),
    );
    // No relayer unless a test adds one.
    let relayer = RelayerConfig {
        url: unreachable_url().await.unwrap(),
        ..RelayerConfig::default()
    };
    LocalNet {
        store,
        node,
        node_url,
        config: BackendConfig {
            local,
            relayer,
            ..BackendConfig::default()
        },
        registry,
    }
}

pub async fn local_net() -> LocalNet {
    local_net_with(NodeBehavior::Healthy).await
}

pub struct RemoteNet {
    pub store: CleartextStore,
    pub relayer: MockRelayer,
    pub relayer_url: String,
    pub config: BackendConfig,
    pub registry: InMemoryRegistry,
}

pub async fn remote_net() -> RemoteNet {
    let store = CleartextStore::new();
    let defaults = RelayerConfig::default();
    let relayer = MockRelayer::new(
        store.clone(),
        RelayerProfile {
            chain_id: defaults.chain_id,
            gateway_chain_id: defaults.gateway_chain_id,
            acl_address: defaults.acl_contract,
            verifying_contract_decryption: defaults.verifying_contract_decryption,
            verifying_contract_input_verification: defaults.verifying_contract_input_verification,
            share_count: 3,
        },
    );
    let relayer_url = spawn(relayer.router()).await.unwrap();
    let registry = InMemoryRegistry::new(
        REGISTRY,
        defaults.chain_id,
        input_verification_domain(
            defaults.gateway_chain_id,
            defaults.verifying_contract_input_verification,
        ),
        vec![relayer.coprocessor_address()],
        store.clone(),
    );
    let config = BackendConfig {
        local: LocalNodeConfig {
            url: unreachable_url().await.unwrap(),
            ..LocalNodeConfig::default()
        },
        relayer: RelayerConfig {
            url: relayer_url.clone(),
            ..defaults
        },
        ..BackendConfig::default()
    };
    RemoteNet {
        store,
        relayer,
        relayer_url,
        config,
        registry,
    }
}

/// Register `issuer` and issue one credential carrying `tag` to [`HOLDER`].
pub async fn issue(
    backend: &Arc<EncryptionBackend>,
    registry: &InMemoryRegistry,
    issuer: Address,
    tag: u32,
) -> CredentialId {
    let ledger = registry.as_sender(issuer);
    if !ledger.is_issuer(issuer).await.unwrap() {
        ledger.register_issuer("Test Academy", "ipfs://issuer").await.unwrap();
    }
    let bundle = input::build(backend.clone(), REGISTRY, issuer, [InputField::uint32(tag)])
        .await
        .unwrap();
    let submission = bundle.into_submission(HOLDER, "ipfs://credential", 0).unwrap();
    ledger.submit_credential_auto(submission).await.unwrap().id
}

pub fn signer() -> Arc<LocalKeySigner> {
    Arc::new(LocalKeySigner::random())
}

/// A wallet whose user refuses every signature request.
pub struct DecliningSigner(pub Address);

#[async_trait]
impl IdentitySigner for DecliningSigner {
    fn address(&self) -> Address {
        self.0
    }

    async fn sign_typed_data(&self, _request: &TypedDataRequest) -> Result<Bytes, SignError> {
        Err(SignError::Declined)
    }
}
