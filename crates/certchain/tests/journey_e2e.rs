//! End-to-end credential journeys through `CertChainClient`.
//!
//! Journey 1: issue, verify, revoke, restore on a simulated developer node
//! Journey 2: holder and stranger verification through a mock relayer
//! Journey 3: issuer registration, explicit ids and history

use alloy_primitives::Address;
use certchain::{CertChainClient, IssueRequest, RootError};
use certchain_core::eip712::input_verification_domain;
use certchain_core::{
    ConfidentialErrorKind, CredentialId, CredentialLedger, EndpointKind, IdentitySigner,
    LocalKeySigner,
};
use certchain_devnet::{
    spawn, unreachable_url, CleartextStore, DevNode, InMemoryRegistry, MockRelayer, RelayerProfile,
};
use certchain_fhe::{
    BackendConfig, BackendSelector, CandidateEndpoint, ConfidentialSession, EncryptionBackend,
    LocalNodeConfig, RelayerConfig,
};
use std::sync::Arc;

const REGISTRY: Address = Address::repeat_byte(0xc0);

struct Network {
    backend: Arc<EncryptionBackend>,
    registry: InMemoryRegistry,
}

impl Network {
    fn client_for(&self, signer: Arc<LocalKeySigner>) -> CertChainClient {
        let ledger = self.registry.as_sender(signer.address());
        let session = ConfidentialSession::new(self.backend.clone(), signer);
        CertChainClient::new(session, Arc::new(ledger))
    }
}

async fn developer_network() -> Network {
    let store = CleartextStore::new();
    let node_url = spawn(DevNode::new(store.clone()).router()).await.unwrap();
    let local = LocalNodeConfig {
        url: node_url.clone(),
        ..LocalNodeConfig::default()
    };
    let coprocessor = LocalKeySigner::from_hex(&local.coprocessor_key).unwrap().address();
    let registry = InMemoryRegistry::new(
        REGISTRY,
        local.chain_id,
        input_verification_domain(local.gateway_chain_id, local.verifying_contract_input_verification),
        vec![coprocessor],
        store,
    );
    let config = BackendConfig {
        local,
        relayer: RelayerConfig {
            url: unreachable_url().await.unwrap(),
            ..RelayerConfig::default()
        },
        ..BackendConfig::default()
    };
    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url(node_url))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Local);
    Network { backend, registry }
}

async fn public_network() -> Network {
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
            share_count: 2,
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
        store,
    );
    let config = BackendConfig {
        local: LocalNodeConfig {
            url: unreachable_url().await.unwrap(),
            ..LocalNodeConfig::default()
        },
        relayer: RelayerConfig {
            url: relayer_url,
            ..defaults
        },
        ..BackendConfig::default()
    };
    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url("https://rpc.sepolia.example".into()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    Network { backend, registry }
}

fn request(recipient: Address, tag: u32) -> IssueRequest {
    IssueRequest {
        recipient,
        metadata_uri: "ipfs://QmCredential".into(),
        valid_until: 0,
        course_tag: tag,
    }
}

// ============================================================================
// Journey 1: issue, verify, revoke, restore
// ============================================================================

#[tokio::test]
async fn test_journey_issue_verify_revoke_restore() {
    let net = developer_network().await;
    let issuer = net.client_for(Arc::new(LocalKeySigner::random()));
    let holder = Address::repeat_byte(0x40);

    assert!(issuer.ensure_issuer("Test Academy", "ipfs://issuer").await.unwrap().is_some());
    let issued = issuer.issue_auto(request(holder, 7)).await.unwrap();

    let status = issuer.verify(issued.id).await.unwrap();
    assert_eq!(status.course_tag, 7);
    assert!(!status.revoked);
    assert!(!status.lapsed);
    assert!(status.is_valid());
    assert_eq!(status.record.owner, holder);
    assert_eq!(status.record.issuer, issuer.user());
    assert_eq!(status.record.metadata_uri, "ipfs://QmCredential");

    issuer.revoke(issued.id, "issued in error").await.unwrap();
    let status = issuer.verify(issued.id).await.unwrap();
    assert!(status.revoked);
    assert_eq!(status.course_tag, 7);
    assert!(!status.is_valid());

    issuer.restore(issued.id).await.unwrap();
    let status = issuer.verify(issued.id).await.unwrap();
    assert!(!status.revoked);
    assert!(status.is_valid());
}

#[tokio::test]
async fn test_journey_lapsed_credential_is_invalid() {
    let net = developer_network().await;
    let issuer = net.client_for(Arc::new(LocalKeySigner::random()));
    issuer.ensure_issuer("Test Academy", "").await.unwrap();

    let mut req = request(Address::repeat_byte(0x40), 3);
    req.valid_until = 1;
    let issued = issuer.issue(req, None).await.unwrap();

    let status = issuer.verify(issued.id).await.unwrap();
    assert!(!status.revoked);
    assert!(status.lapsed);
    assert!(!status.is_valid());
}

#[tokio::test]
async fn test_journey_verify_unknown_credential() {
    let net = developer_network().await;
    let client = net.client_for(Arc::new(LocalKeySigner::random()));

    let err = client.verify(CredentialId::random()).await.unwrap_err();
    assert!(matches!(err, RootError::NotFound(_)));
}

#[tokio::test]
async fn test_journey_unregistered_issuer_rejected() {
    let net = developer_network().await;
    let client = net.client_for(Arc::new(LocalKeySigner::random()));

    let err = client
        .issue_auto(request(Address::repeat_byte(0x40), 7))
        .await
        .unwrap_err();
    assert_eq!(err.confidential_kind(), Some(ConfidentialErrorKind::Ledger));
    assert_eq!(net.registry.credential_count().unwrap(), 0);
}

// ============================================================================
// Journey 2: holder and stranger through the relayer
// ============================================================================

#[tokio::test]
async fn test_journey_holder_verifies_through_relayer() {
    let net = public_network().await;
    let issuer = net.client_for(Arc::new(LocalKeySigner::random()));
    let holder_signer = Arc::new(LocalKeySigner::random());
    let holder = net.client_for(holder_signer.clone());

    issuer.ensure_issuer("Test Academy", "").await.unwrap();
    let issued = issuer.issue_auto(request(holder_signer.address(), 42)).await.unwrap();

    let status = holder.verify(issued.id).await.unwrap();
    assert_eq!(status.course_tag, 42);
    assert!(!status.revoked);
    assert_eq!(holder.session().cached_grants().unwrap(), 1);

    // The holder cannot revoke what they did not issue.
    let err = holder.revoke(issued.id, "mine").await.unwrap_err();
    assert_eq!(err.confidential_kind(), Some(ConfidentialErrorKind::Ledger));
}

#[tokio::test]
async fn test_journey_stranger_cannot_decrypt() {
    let net = public_network().await;
    let issuer = net.client_for(Arc::new(LocalKeySigner::random()));
    let stranger = net.client_for(Arc::new(LocalKeySigner::random()));

    issuer.ensure_issuer("Test Academy", "").await.unwrap();
    let issued = issuer.issue_auto(request(Address::repeat_byte(0x40), 9)).await.unwrap();

    let err = stranger.verify(issued.id).await.unwrap_err();
    assert_eq!(err.confidential_kind(), Some(ConfidentialErrorKind::DecryptionFailure));
}

// ============================================================================
// Journey 3: registration, explicit ids, history
// ============================================================================

#[tokio::test]
async fn test_journey_registration_is_idempotent() {
    let net = developer_network().await;
    let client = net.client_for(Arc::new(LocalKeySigner::random()));

    assert!(!client.is_issuer(client.user()).await.unwrap());
    assert!(client.ensure_issuer("Academy", "ipfs://a").await.unwrap().is_some());
    assert!(client.ensure_issuer("Academy", "ipfs://a").await.unwrap().is_none());
    assert!(client.is_issuer(client.user()).await.unwrap());

    // Direct re-registration is a ledger error.
    assert!(client.register_issuer("Academy", "ipfs://a").await.is_err());
}

#[tokio::test]
async fn test_journey_explicit_id_and_history() {
    let net = developer_network().await;
    let issuer = net.client_for(Arc::new(LocalKeySigner::random()));
    issuer.ensure_issuer("Academy", "").await.unwrap();
    let holder = Address::repeat_byte(0x41);

    let chosen = CredentialId::random();
    let first = issuer.issue(request(holder, 1), Some(chosen)).await.unwrap();
    assert_eq!(first.id, chosen);
    let second = issuer.issue_auto(request(holder, 2)).await.unwrap();
    issuer
        .issue_auto(request(Address::repeat_byte(0x42), 3))
        .await
        .unwrap();

    // Reusing an id is rejected.
    assert!(issuer.issue(request(holder, 4), Some(chosen)).await.is_err());

    let history = issuer.history(holder).await.unwrap();
    assert_eq!(history, vec![chosen, second.id]);
    assert!(issuer.history(Address::repeat_byte(0x43)).await.unwrap().is_empty());

    let ledger: &dyn CredentialLedger = issuer.ledger().as_ref();
    assert_eq!(ledger.contract_address(), REGISTRY);
}
