//! The relayer client is loaded once per process, however many sessions
//! race to resolve a remote backend.

mod common;

use certchain_core::EndpointKind;
use certchain_fhe::{loader, BackendSelector, CandidateEndpoint};
use common::remote_net;
use std::sync::Arc;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_loads_client_once() {
    let net = remote_net().await;
    let selector = Arc::new(BackendSelector::new(net.config.clone()));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let selector = selector.clone();
        tasks.spawn(async move {
            selector
                .resolve(CandidateEndpoint::Url("https://rpc.sepolia.example".into()))
                .await
        });
    }
    let mut resolved = 0;
    while let Some(joined) = tasks.join_next().await {
        let backend = joined.unwrap().unwrap();
        assert_eq!(backend.kind(), EndpointKind::Remote);
        resolved += 1;
    }

    assert_eq!(resolved, 8);
    assert_eq!(loader::load_count(), 1);
}
