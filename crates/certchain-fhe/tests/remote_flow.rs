//! Issue, decrypt and revoke through the relayer-backed backend.

mod common;

use certchain_core::{ClearValue, ConfidentialError, CredentialLedger, EndpointKind, IdentitySigner};
use certchain_fhe::{BackendSelector, CandidateEndpoint, ConfidentialSession};
use common::{issue, remote_net, signer, REGISTRY};

#[tokio::test]
async fn test_remote_issue_decrypt_revoke() {
    let net = remote_net().await;
    let backend = BackendSelector::new(net.config.clone())
        .resolve(CandidateEndpoint::Url("https://rpc.sepolia.example".into()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);

    let issuer = signer();
    let id = issue(&backend, &net.registry, issuer.address(), 7).await;
    assert_eq!(net.relayer.input_proof_count(), 1);

    let session = ConfidentialSession::new(backend.clone(), issuer.clone());
    let record = net.registry.get_credential(id).await.unwrap().unwrap();
    let values = session.decrypt(&record.confidential_pairs(REGISTRY)).await.unwrap();
    assert_eq!(values[&record.revoked_handle], ClearValue::Bool(false));
    assert_eq!(values[&record.course_tag_handle].as_u32(), Some(7));

    net.registry
        .as_sender(issuer.address())
        .set_revoked(id, "issued in error")
        .await
        .unwrap();
    let record = net.registry.get_credential(id).await.unwrap().unwrap();
    let values = session.decrypt(&record.confidential_pairs(REGISTRY)).await.unwrap();
    assert_eq!(values[&record.revoked_handle], ClearValue::Bool(true));
    assert_eq!(values[&record.course_tag_handle].as_u32(), Some(7));
    assert_eq!(net.relayer.user_decrypt_count(), 2);
}

#[tokio::test]
async fn test_remote_stranger_cannot_decrypt() {
    let net = remote_net().await;
    let backend = BackendSelector::new(net.config.clone())
        .resolve(CandidateEndpoint::Url("https://rpc.sepolia.example".into()))
        .await
        .unwrap();
    let issuer = signer();
    let id = issue(&backend, &net.registry, issuer.address(), 7).await;
    let record = net.registry.get_credential(id).await.unwrap().unwrap();

    let stranger = ConfidentialSession::new(backend, signer());
    let err = stranger
        .decrypt(&record.confidential_pairs(REGISTRY))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfidentialError::DecryptionFailure(_)));
}
