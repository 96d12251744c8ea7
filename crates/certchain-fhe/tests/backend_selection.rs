//! Backend selection against live mock servers.
//!
//! Matrix: {healthy, unreachable, hanging, wrong marker, malformed JSON}
//! developer node, a candidate transport that cannot report its chain, plus
//! a non-developer chain that must never trigger a local probe.

mod common;

use async_trait::async_trait;
use certchain_core::{ConfidentialError, ConfidentialResult, EndpointKind, NetworkTransport};
use certchain_devnet::{spawn, unreachable_url, CleartextStore, DevNode, NodeBehavior};
use certchain_fhe::{BackendSelector, CandidateEndpoint, HttpTransport};
use common::{local_net, local_net_with, remote_net};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A wallet transport whose every request fails.
#[derive(Default)]
struct BrokenTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl NetworkTransport for BrokenTransport {
    async fn request(&self, method: &str, _params: Value) -> ConfidentialResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConfidentialError::Transport(format!("{}: connection reset", method)))
    }

    fn describe(&self) -> String {
        "broken://wallet".into()
    }
}

#[tokio::test]
async fn test_healthy_dev_node_by_url_selects_local() {
    let net = local_net().await;
    let backend = BackendSelector::new(net.config.clone())
        .resolve(CandidateEndpoint::Url(net.node_url.clone()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Local);
    assert_eq!(backend.network().chain_id, 31337);
    assert!(net.node.request_count() >= 2);
}

#[tokio::test]
async fn test_healthy_dev_node_by_transport_selects_local() {
    let net = local_net().await;
    let transport: Arc<dyn NetworkTransport> =
        Arc::new(HttpTransport::new(net.node_url.clone(), Duration::from_secs(5)).unwrap());
    let backend = BackendSelector::new(net.config.clone())
        .resolve(CandidateEndpoint::Transport(transport))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Local);
}

#[tokio::test]
async fn test_unreachable_node_falls_back_to_relayer() {
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local.probe_timeout_ms = 500;
    let candidate = CandidateEndpoint::Url(config.local.url.clone());

    let backend = BackendSelector::new(config).resolve(candidate).await.unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    assert_eq!(backend.network().chain_id, 11155111);
}

#[tokio::test]
async fn test_hanging_node_falls_back_after_timeout() {
    let local = local_net_with(NodeBehavior::Hang).await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();
    config.local.probe_timeout_ms = 200;

    let started = Instant::now();
    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url(local.node_url.clone()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    assert!(started.elapsed() < certchain_devnet::node::HANG_FOR);
}

#[tokio::test]
async fn test_failing_chain_id_query_falls_back_to_relayer() {
    let local = local_net().await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();

    let broken = Arc::new(BrokenTransport::default());
    let transport: Arc<dyn NetworkTransport> = broken.clone();
    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Transport(transport))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    assert_eq!(backend.network().rpc_target, "broken://wallet");
    assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    // An unknown chain is never treated as the developer chain.
    assert_eq!(local.node.request_count(), 0);
}

#[tokio::test]
async fn test_wrong_marker_falls_back_to_relayer() {
    let local = local_net_with(NodeBehavior::WrongMarker).await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();

    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url(local.node_url.clone()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    // Probing stops at the version check.
    assert_eq!(local.node.request_count(), 1);
}

#[tokio::test]
async fn test_malformed_json_falls_back_to_relayer() {
    let local = local_net_with(NodeBehavior::MalformedJson).await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();

    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url(local.node_url.clone()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
}

#[tokio::test]
async fn test_non_dev_chain_never_probes_local_node() {
    let local = local_net().await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();

    // A candidate on Sepolia, while a perfectly healthy dev node is configured.
    let sepolia = DevNode::on_chain(CleartextStore::new(), NodeBehavior::Healthy, 11155111);
    let sepolia_url = spawn(sepolia.router()).await.unwrap();
    let transport: Arc<dyn NetworkTransport> =
        Arc::new(HttpTransport::new(sepolia_url, Duration::from_secs(5)).unwrap());

    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Transport(transport))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    assert_eq!(local.node.request_count(), 0);
    assert_eq!(sepolia.request_count(), 1);
}

#[tokio::test]
async fn test_non_loopback_url_goes_remote() {
    let local = local_net().await;
    let remote = remote_net().await;
    let mut config = remote.config.clone();
    config.local = local.config.local.clone();

    let backend = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url("https://rpc.sepolia.example".into()))
        .await
        .unwrap();
    assert_eq!(backend.kind(), EndpointKind::Remote);
    assert_eq!(local.node.request_count(), 0);
}

#[tokio::test]
async fn test_nothing_reachable_is_backend_unavailable() {
    let local = local_net_with(NodeBehavior::WrongMarker).await;
    let mut config = local.config.clone();
    config.relayer.url = unreachable_url().await.unwrap();

    let err = BackendSelector::new(config)
        .resolve(CandidateEndpoint::Url(local.node_url.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfidentialError::BackendUnavailable(_)));
}
