use alloy_primitives::{keccak256, Address, B256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use certchain_core::eip712::CiphertextVerification;
use certchain_core::proof::InputProof;
use certchain_core::{
    recover_signer, CiphertextHandle, ClearValue, ConfidentialError, ConfidentialResult,
    CredentialId, CredentialLedger, CredentialRecord, CredentialSubmission, FheType,
    IssuedCredential, Timestamp,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::CleartextStore;

#[derive(Debug, Default)]
struct RegistryState {
    issuers: HashMap<Address, String>,
    credentials: BTreeMap<CredentialId, CredentialRecord>,
    issued: Vec<(Address, CredentialId)>,
    spent_proofs: HashSet<B256>,
    nonce: u64,
}

impl RegistryState {
    fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }
}

/// Credential registry held in memory.
///
/// Behaves like the deployed contract for everything the client can
/// observe: only registered issuers may issue, the input proof must be
/// attested for the transaction sender, a proof is accepted once, and the
/// revocation flag is a ledger-computed ciphertext. Each view acts as one
/// sender; [`as_sender`](Self::as_sender) switches accounts over the same
/// state.
#[derive(Debug, Clone)]
pub struct InMemoryRegistry {
    contract: Address,
    chain_id: u64,
    input_domain: Eip712Domain,
    coprocessors: Arc<Vec<Address>>,
    store: CleartextStore,
    state: Arc<Mutex<RegistryState>>,
    sender: Address,
}

impl InMemoryRegistry {
    pub fn new(
        contract: Address,
        chain_id: u64,
        input_domain: Eip712Domain,
        coprocessors: Vec<Address>,
        store: CleartextStore,
    ) -> Self {
        Self {
            contract,
            chain_id,
            input_domain,
            coprocessors: Arc::new(coprocessors),
            store,
            state: Arc::new(Mutex::new(RegistryState::default())),
            sender: Address::ZERO,
        }
    }

    /// The same registry, with transactions sent from `sender`.
    pub fn as_sender(&self, sender: Address) -> Self {
        Self {
            sender,
            ..self.clone()
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn credential_count(&self) -> ConfidentialResult<usize> {
        Ok(self.lock()?.credentials.len())
    }

    fn lock(&self) -> ConfidentialResult<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|e| ConfidentialError::Ledger(format!("registry lock poisoned: {}", e)))
    }

    fn tx_hash(&self, state: &mut RegistryState) -> B256 {
        let nonce = state.next_nonce();
        let mut preimage = Vec::with_capacity(60);
        preimage.extend_from_slice(self.sender.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(self.contract.as_slice());
        keccak256(preimage)
    }

    /// Check the proof for `submission` and return the proof digest to spend.
    fn verify_input(&self, state: &RegistryState, submission: &CredentialSubmission) -> ConfidentialResult<B256> {
        let proof = InputProof::decode(&submission.proof)
            .map_err(|e| ConfidentialError::Ledger(format!("invalid input proof: {}", e)))?;
        let tag = submission.encrypted_tag;
        if !proof.handles.contains(&tag) {
            return Err(ConfidentialError::Ledger("course tag is not covered by the proof".into()));
        }
        if tag.chain_id() != self.chain_id || tag.fhe_type() != Some(FheType::Uint32) {
            return Err(ConfidentialError::Ledger(format!("course tag {} is not a euint32 for this chain", tag)));
        }

        let attestation = CiphertextVerification::new(
            &proof.handles,
            self.sender,
            self.contract,
            self.chain_id,
            proof.extra_data.clone(),
        );
        let digest = attestation.eip712_signing_hash(&self.input_domain);
        let attested = !proof.signatures.is_empty()
            && proof.signatures.iter().all(|sig| {
                recover_signer(&digest, sig).is_some_and(|signer| self.coprocessors.contains(&signer))
            });
        if !attested {
            return Err(ConfidentialError::Ledger(
                "input proof is not attested for this sender and contract".into(),
            ));
        }

        let spent = keccak256(&submission.proof);
        if state.spent_proofs.contains(&spent) {
            return Err(ConfidentialError::Ledger("input proof already used".into()));
        }

        if let Some(words) = proof.mock_cleartexts() {
            for (handle, word) in proof.handles.iter().zip(words) {
                self.store.insert(*handle, word);
            }
        }
        if !self.store.contains(&tag) {
            return Err(ConfidentialError::Ledger(format!("unknown ciphertext {}", tag)));
        }
        Ok(spent)
    }

    /// A fresh ledger-computed revocation flag readable by issuer and owner.
    fn revocation_flag(&self, state: &mut RegistryState, id: CredentialId, revoked: bool, owner: Address, issuer: Address) -> CiphertextHandle {
        let nonce = state.next_nonce();
        let mut seed = id.0.to_vec();
        seed.extend_from_slice(&nonce.to_be_bytes());
        let handle = CiphertextHandle::computed(&seed, FheType::Bool, self.chain_id);
        self.store.insert(handle, ClearValue::Bool(revoked).to_word());
        for account in [issuer, owner, self.contract] {
            self.store.allow(handle, account);
        }
        handle
    }

    fn issue(&self, id: CredentialId, submission: CredentialSubmission) -> ConfidentialResult<IssuedCredential> {
        let mut state = self.lock()?;
        if !state.issuers.contains_key(&self.sender) {
            return Err(ConfidentialError::Ledger(format!("{} is not a registered issuer", self.sender)));
        }
        if state.credentials.contains_key(&id) {
            return Err(ConfidentialError::Ledger(format!("credential {} already exists", id)));
        }
        let spent = self.verify_input(&state, &submission)?;
        state.spent_proofs.insert(spent);

        let tag = submission.encrypted_tag;
        for account in [self.sender, submission.recipient, self.contract] {
            self.store.allow(tag, account);
        }
        let revoked_handle = self.revocation_flag(&mut state, id, false, submission.recipient, self.sender);
        let record = CredentialRecord {
            id,
            issuer: self.sender,
            owner: submission.recipient,
            metadata_uri: submission.metadata_uri,
            issued_at: Timestamp::now().seconds_since_epoch,
            valid_until: submission.valid_until,
            revoked_handle,
            course_tag_handle: tag,
        };
        state.credentials.insert(id, record);
        state.issued.push((submission.recipient, id));
        let tx_hash = self.tx_hash(&mut state);

        tracing::info!(credential = %id, issuer = %self.sender, recipient = %submission.recipient, "credential issued");
        Ok(IssuedCredential { tx_hash, id })
    }

    fn set_flag(&self, id: CredentialId, revoked: bool) -> ConfidentialResult<B256> {
        let mut state = self.lock()?;
        let (issuer, owner) = match state.credentials.get(&id) {
            Some(record) => (record.issuer, record.owner),
            None => return Err(ConfidentialError::Ledger(format!("unknown credential {}", id))),
        };
        if issuer != self.sender {
            return Err(ConfidentialError::Ledger(format!(
                "only issuer {} may change credential {}",
                issuer, id
            )));
        }
        let flag = self.revocation_flag(&mut state, id, revoked, owner, issuer);
        if let Some(record) = state.credentials.get_mut(&id) {
            record.revoked_handle = flag;
        }
        Ok(self.tx_hash(&mut state))
    }
}

#[async_trait]
impl CredentialLedger for InMemoryRegistry {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn submit_credential(
        &self,
        id: CredentialId,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential> {
        self.issue(id, submission)
    }

    async fn submit_credential_auto(
        &self,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential> {
        let id = {
            let mut state = self.lock()?;
            let nonce = state.next_nonce();
            let mut preimage = Vec::with_capacity(48);
            preimage.extend_from_slice(self.sender.as_slice());
            preimage.extend_from_slice(submission.recipient.as_slice());
            preimage.extend_from_slice(&nonce.to_be_bytes());
            CredentialId(keccak256(preimage))
        };
        self.issue(id, submission)
    }

    async fn get_credential(&self, id: CredentialId) -> ConfidentialResult<Option<CredentialRecord>> {
        Ok(self.lock()?.credentials.get(&id).cloned())
    }

    async fn set_revoked(&self, id: CredentialId, reason: &str) -> ConfidentialResult<B256> {
        let tx = self.set_flag(id, true)?;
        tracing::info!(credential = %id, reason, "credential revoked");
        Ok(tx)
    }

    async fn clear_revoked(&self, id: CredentialId) -> ConfidentialResult<B256> {
        let tx = self.set_flag(id, false)?;
        tracing::info!(credential = %id, "credential restored");
        Ok(tx)
    }

    async fn is_issuer(&self, account: Address) -> ConfidentialResult<bool> {
        Ok(self.lock()?.issuers.contains_key(&account))
    }

    async fn register_issuer(&self, name: &str, metadata_uri: &str) -> ConfidentialResult<B256> {
        let mut state = self.lock()?;
        if state.issuers.contains_key(&self.sender) {
            return Err(ConfidentialError::Ledger(format!("{} is already an issuer", self.sender)));
        }
        state.issuers.insert(self.sender, name.to_string());
        tracing::info!(issuer = %self.sender, name, metadata_uri, "issuer registered");
        Ok(self.tx_hash(&mut state))
    }

    async fn issued_to(&self, recipient: Address) -> ConfidentialResult<Vec<CredentialId>> {
        Ok(self
            .lock()?
            .issued
            .iter()
            .filter(|(to, _)| *to == recipient)
            .map(|(_, id)| *id)
            .collect())
    }
}
