use certchain_core::wire::RelayerMetadata;
use certchain_core::{
    ConfidentialError, ConfidentialResult, EndpointKind, NetworkContext, NetworkTransport,
};
use k256::ecdsa::SigningKey;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::backend::{EncryptionBackend, LocalBackend, RemoteBackend};
use crate::config::BackendConfig;
use crate::loader;
use crate::rpc::{is_loopback_url, HttpTransport};

/// What the caller has to offer as a network: a live transport, or just a URL.
#[derive(Clone)]
pub enum CandidateEndpoint {
    Transport(Arc<dyn NetworkTransport>),
    Url(String),
}

impl fmt::Debug for CandidateEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(t) => f.debug_tuple("Transport").field(&t.describe()).finish(),
            Self::Url(u) => f.debug_tuple("Url").field(u).finish(),
        }
    }
}

/// Decides, once per session, which encryption backend serves a candidate.
///
/// Selection order:
/// 1. Determine the candidate's chain id. Transports are asked; URLs count
///    as the developer chain only when they point at a loopback host.
/// 2. On the developer chain, probe the configured local node. Every probe
///    failure is logged and falls through.
/// 3. Otherwise load the relayer client and connect to the production
///    relayer. Only this step can fail the resolution.
#[derive(Debug, Clone)]
pub struct BackendSelector {
    config: BackendConfig,
}

impl BackendSelector {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub async fn resolve(&self, candidate: CandidateEndpoint) -> ConfidentialResult<Arc<EncryptionBackend>> {
        let chain_id = self.candidate_chain_id(&candidate).await;

        if chain_id == Some(self.config.local.chain_id) {
            if let Some(local) = self.probe_local().await {
                tracing::info!(
                    node = %self.config.local.url,
                    chain_id = local.network().chain_id,
                    "using simulated encryption backend"
                );
                return Ok(Arc::new(EncryptionBackend::Local(local)));
            }
        }

        let remote = self.connect_remote(candidate).await?;
        tracing::info!(
            relayer = %self.config.relayer.url,
            chain_id = remote.network().chain_id,
            "using relayer encryption backend"
        );
        Ok(Arc::new(EncryptionBackend::Remote(remote)))
    }

    async fn candidate_chain_id(&self, candidate: &CandidateEndpoint) -> Option<u64> {
        match candidate {
            CandidateEndpoint::Transport(transport) => match transport.chain_id().await {
                Ok(id) => {
                    tracing::debug!(target_rpc = %transport.describe(), chain_id = id, "candidate chain id");
                    Some(id)
                }
                Err(e) => {
                    tracing::warn!(target_rpc = %transport.describe(), error = %e, "chain id query failed");
                    None
                }
            },
            CandidateEndpoint::Url(url) if is_loopback_url(url) => {
                tracing::debug!(url = %url, "loopback url, assuming developer chain");
                Some(self.config.local.chain_id)
            }
            CandidateEndpoint::Url(url) => {
                tracing::debug!(url = %url, "non-loopback url, chain id unknown");
                None
            }
        }
    }

    /// Ordered probe of the developer node. `None` means "not local".
    async fn probe_local(&self) -> Option<LocalBackend> {
        let local = &self.config.local;
        let probe = probe_step(
            "connect",
            HttpTransport::new(local.url.clone(), local.probe_timeout()),
        )?;

        let version = probe_step(
            "web3_clientVersion",
            probe.request("web3_clientVersion", json!([])).await,
        )?;
        let Some(version) = version.as_str() else {
            tracing::warn!(node = %local.url, "client version is not a string");
            return None;
        };
        if !version.to_ascii_lowercase().contains(&local.client_marker.to_ascii_lowercase()) {
            tracing::debug!(node = %local.url, version, marker = %local.client_marker, "not a developer node");
            return None;
        }

        let raw = probe_step(
            "fhevm_relayer_metadata",
            probe.request("fhevm_relayer_metadata", json!([])).await,
        )?;
        let metadata: RelayerMetadata = probe_step(
            "decode metadata",
            serde_json::from_value(raw)
                .map_err(|e| ConfidentialError::Transport(format!("malformed relayer metadata: {}", e))),
        )?;

        let coprocessor = probe_step("coprocessor key", parse_key(&local.coprocessor_key))?;
        let node: Arc<dyn NetworkTransport> = Arc::new(probe_step(
            "node transport",
            HttpTransport::new(local.url.clone(), self.config.request_timeout()),
        )?);

        let network = NetworkContext {
            chain_id: local.chain_id,
            endpoint_kind: EndpointKind::Local,
            rpc_target: local.url.clone(),
        };
        Some(LocalBackend::new(network, node, metadata, local, coprocessor))
    }

    async fn connect_remote(&self, candidate: CandidateEndpoint) -> ConfidentialResult<RemoteBackend> {
        let transport: Arc<dyn NetworkTransport> = match candidate {
            CandidateEndpoint::Transport(t) => t,
            CandidateEndpoint::Url(url) => Arc::new(
                HttpTransport::new(url, self.config.request_timeout())
                    .map_err(|e| ConfidentialError::BackendUnavailable(e.to_string()))?,
            ),
        };
        let client = loader::relayer_client(self.config.request_timeout())
            .await
            .map_err(|e| match e {
                ConfidentialError::BackendUnavailable(_) => e,
                other => ConfidentialError::BackendUnavailable(other.to_string()),
            })?;
        RemoteBackend::connect(self.config.relayer.clone(), client, transport).await
    }
}

fn probe_step<T>(step: &'static str, result: ConfidentialResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(step, error = %e, "local backend probe failed");
            None
        }
    }
}

fn parse_key(hex_key: &str) -> ConfidentialResult<SigningKey> {
    let raw = hex_key.trim().trim_start_matches("0x");
    let bytes = zeroize::Zeroizing::new(
        hex::decode(raw).map_err(|e| ConfidentialError::Signing(format!("coprocessor key: {}", e)))?,
    );
    SigningKey::from_slice(&bytes)
        .map_err(|e| ConfidentialError::Signing(format!("coprocessor key: {}", e)))
}
