//! Credential operations on top of the confidential-field protocol.

use alloy_primitives::{Address, B256};
use certchain_core::{
    ClearValue, ConfidentialError, CredentialId, CredentialLedger, CredentialRecord,
    IdentitySigner, IssuedCredential, LocalKeySigner, NetworkTransport, Timestamp,
};
use certchain_fhe::{BackendSelector, CandidateEndpoint, ConfidentialSession, HttpTransport, WalletSigner};
use serde::Serialize;
use std::sync::Arc;

use crate::config::RootConfig;
use crate::error::{RootError, RootResult};
use crate::registry::RegistryClient;

/// Environment variable holding a hex private key for the local signer.
pub const PRIVATE_KEY_ENV: &str = "CERTCHAIN_PRIVATE_KEY";

/// The acting identity: a local key from [`PRIVATE_KEY_ENV`] when set,
/// otherwise the node's first account, signing through the wallet.
pub async fn resolve_identity(transport: Arc<dyn NetworkTransport>) -> RootResult<Arc<dyn IdentitySigner>> {
    match std::env::var(PRIVATE_KEY_ENV) {
        Ok(key) => {
            let signer = LocalKeySigner::from_hex(key.trim())
                .map_err(|e| RootError::Identity(format!("{}: {}", PRIVATE_KEY_ENV, e)))?;
            tracing::debug!(address = %signer.address(), "using local key signer");
            Ok(Arc::new(signer))
        }
        Err(_) => {
            let wallet = WalletSigner::first_account(transport)
                .await
                .map_err(|e| RootError::Identity(format!("no wallet account: {}", e)))?;
            tracing::debug!(address = %wallet.address(), "using wallet signer");
            Ok(Arc::new(wallet))
        }
    }
}

/// What an issuer supplies for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub recipient: Address,
    /// Usually an `ipfs://` URI from the pinning client.
    pub metadata_uri: String,
    /// Unix seconds; zero means the credential never lapses.
    pub valid_until: u64,
    /// Confidential course tag.
    pub course_tag: u32,
}

/// A credential together with its decrypted confidential fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub record: CredentialRecord,
    pub revoked: bool,
    pub course_tag: u32,
    /// Past `valid_until` at the time of the check.
    pub lapsed: bool,
}

impl CredentialStatus {
    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.lapsed
    }
}

/// One user's handle on a credential registry.
pub struct CertChainClient {
    session: ConfidentialSession,
    ledger: Arc<dyn CredentialLedger>,
}

impl CertChainClient {
    /// Connect to the configured node and registry: resolve the encryption
    /// backend for the node's chain, then the acting identity.
    pub async fn connect(config: &RootConfig) -> RootResult<Self> {
        config.validate()?;
        let registry = config.registry()?;
        let transport: Arc<dyn NetworkTransport> = Arc::new(HttpTransport::new(
            config.rpc_url.clone(),
            config.backend.request_timeout(),
        )?);
        let backend = BackendSelector::new(config.backend.clone())
            .resolve(CandidateEndpoint::Transport(transport.clone()))
            .await?;
        let signer = resolve_identity(transport.clone()).await?;
        let ledger = RegistryClient::new(transport, registry, signer.address(), config.receipt_timeout());
        let session = ConfidentialSession::with_policy(backend, signer, config.grant_policy()?);
        Ok(Self::new(session, Arc::new(ledger)))
    }

    pub fn new(session: ConfidentialSession, ledger: Arc<dyn CredentialLedger>) -> Self {
        Self { session, ledger }
    }

    pub fn session(&self) -> &ConfidentialSession {
        &self.session
    }

    pub fn ledger(&self) -> &Arc<dyn CredentialLedger> {
        &self.ledger
    }

    pub fn user(&self) -> Address {
        self.session.user()
    }

    /// Issue under `id`, or under a fresh random id when `None`.
    pub async fn issue(&self, request: IssueRequest, id: Option<CredentialId>) -> RootResult<IssuedCredential> {
        let id = id.unwrap_or_else(CredentialId::random);
        let submission = self.encrypt_tag(&request).await?;
        Ok(self.ledger.submit_credential(id, submission).await?)
    }

    /// Issue and let the registry choose the id.
    pub async fn issue_auto(&self, request: IssueRequest) -> RootResult<IssuedCredential> {
        let submission = self.encrypt_tag(&request).await?;
        Ok(self.ledger.submit_credential_auto(submission).await?)
    }

    async fn encrypt_tag(&self, request: &IssueRequest) -> RootResult<certchain_core::CredentialSubmission> {
        let mut builder = self.session.encrypt_input(self.ledger.contract_address());
        builder.add_uint32(request.course_tag);
        let bundle = builder.encrypt().await?;
        Ok(bundle.into_submission(request.recipient, request.metadata_uri.clone(), request.valid_until)?)
    }

    /// Read a credential and decrypt its revocation flag and course tag in
    /// one batch.
    pub async fn verify(&self, id: CredentialId) -> RootResult<CredentialStatus> {
        let record = self
            .ledger
            .get_credential(id)
            .await?
            .ok_or_else(|| RootError::NotFound(id.to_string()))?;
        let values = self
            .session
            .decrypt(&record.confidential_pairs(self.ledger.contract_address()))
            .await?;

        let revoked = values
            .get(&record.revoked_handle)
            .and_then(ClearValue::as_bool)
            .ok_or_else(|| decoded_wrong("revocation flag"))?;
        let course_tag = values
            .get(&record.course_tag_handle)
            .and_then(ClearValue::as_u32)
            .ok_or_else(|| decoded_wrong("course tag"))?;
        let lapsed = record.is_lapsed_at(Timestamp::now().seconds_since_epoch);

        tracing::info!(credential = %id, revoked, lapsed, "credential verified");
        Ok(CredentialStatus {
            record,
            revoked,
            course_tag,
            lapsed,
        })
    }

    pub async fn revoke(&self, id: CredentialId, reason: &str) -> RootResult<B256> {
        Ok(self.ledger.set_revoked(id, reason).await?)
    }

    pub async fn restore(&self, id: CredentialId) -> RootResult<B256> {
        Ok(self.ledger.clear_revoked(id).await?)
    }

    pub async fn is_issuer(&self, account: Address) -> RootResult<bool> {
        Ok(self.ledger.is_issuer(account).await?)
    }

    pub async fn register_issuer(&self, name: &str, metadata_uri: &str) -> RootResult<B256> {
        Ok(self.ledger.register_issuer(name, metadata_uri).await?)
    }

    /// Register this user as an issuer unless already registered. Returns
    /// the registration transaction when one was sent.
    pub async fn ensure_issuer(&self, name: &str, metadata_uri: &str) -> RootResult<Option<B256>> {
        if self.is_issuer(self.user()).await? {
            return Ok(None);
        }
        self.register_issuer(name, metadata_uri).await.map(Some)
    }

    /// Credentials issued to `recipient`, oldest first.
    pub async fn history(&self, recipient: Address) -> RootResult<Vec<CredentialId>> {
        Ok(self.ledger.issued_to(recipient).await?)
    }
}

fn decoded_wrong(field: &str) -> RootError {
    RootError::Confidential(ConfidentialError::DecryptionFailure(format!(
        "{} did not decrypt to the expected type",
        field
    )))
}
