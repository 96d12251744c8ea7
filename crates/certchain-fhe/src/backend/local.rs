use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use certchain_core::eip712::{decryption_domain, input_verification_domain, CiphertextVerification};
use certchain_core::proof::{cleartext_extra_data, InputProof};
use certchain_core::wire::{encode_packed_inputs, HandleContractPairWire, RelayerMetadata};
use certchain_core::{
    derive_input_handles, sign_hash, signer_matches, CiphertextHandle, ConfidentialError,
    ConfidentialResult, FheType, HandleContractPair, InputField, NetworkContext, NetworkTransport,
};
use k256::ecdsa::SigningKey;
use rand::RngCore;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::config::LocalNodeConfig;
use crate::grant::DecryptionGrant;

/// Simulated encryption against a developer node.
///
/// Ciphertexts are salted plaintext blobs, the proof is attested with a
/// development coprocessor key and carries the plaintext words so the node
/// can register them. Decryption checks the grant signature and then reads
/// the node's cleartext table, which enforces the handle ACL.
pub struct LocalBackend {
    network: NetworkContext,
    node: Arc<dyn NetworkTransport>,
    metadata: RelayerMetadata,
    gateway_chain_id: u64,
    verifying_contract_decryption: Address,
    verifying_contract_input_verification: Address,
    coprocessor: SigningKey,
}

impl LocalBackend {
    pub fn new(
        network: NetworkContext,
        node: Arc<dyn NetworkTransport>,
        metadata: RelayerMetadata,
        config: &LocalNodeConfig,
        coprocessor: SigningKey,
    ) -> Self {
        Self {
            network,
            node,
            metadata,
            gateway_chain_id: config.gateway_chain_id,
            verifying_contract_decryption: config.verifying_contract_decryption,
            verifying_contract_input_verification: config.verifying_contract_input_verification,
            coprocessor,
        }
    }

    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    pub fn metadata(&self) -> &RelayerMetadata {
        &self.metadata
    }

    pub fn decryption_domain(&self) -> Eip712Domain {
        decryption_domain(self.gateway_chain_id, self.verifying_contract_decryption)
    }

    pub fn input_verification_domain(&self) -> Eip712Domain {
        input_verification_domain(self.gateway_chain_id, self.verifying_contract_input_verification)
    }

    pub(crate) fn encrypt(
        &self,
        contract: Address,
        submitter: Address,
        fields: &[InputField],
    ) -> ConfidentialResult<(Vec<CiphertextHandle>, Bytes)> {
        let mut blob = encode_packed_inputs(fields);
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        blob.extend_from_slice(&salt);

        let types: Vec<FheType> = fields.iter().map(|f| f.fhe_type).collect();
        let handles = derive_input_handles(
            &blob,
            self.metadata.acl_address,
            self.network.chain_id,
            &types,
        );

        let words: Vec<B256> = fields.iter().map(|f| f.value.to_word()).collect();
        let extra_data = cleartext_extra_data(&words);
        let attestation = CiphertextVerification::new(
            &handles,
            submitter,
            contract,
            self.network.chain_id,
            extra_data.clone(),
        );
        let digest = attestation.eip712_signing_hash(&self.input_verification_domain());
        let signature = sign_hash(&self.coprocessor, &digest)
            .map_err(|e| ConfidentialError::EncryptionFailure(e.to_string()))?;

        let proof = InputProof {
            handles: handles.clone(),
            signatures: vec![Bytes::copy_from_slice(&signature)],
            extra_data,
        }
        .encode()
        .map_err(|e| ConfidentialError::EncryptionFailure(e.to_string()))?;

        tracing::debug!(
            contract = %contract,
            submitter = %submitter,
            handles = handles.len(),
            "simulated input encrypted"
        );
        Ok((handles, proof))
    }

    pub(crate) async fn authorized_decrypt(
        &self,
        grant: &DecryptionGrant,
        pairs: &[HandleContractPair],
    ) -> ConfidentialResult<Vec<(CiphertextHandle, B256)>> {
        let digest = grant
            .request_message()
            .eip712_signing_hash(&self.decryption_domain());
        if !signer_matches(&digest, grant.signature(), grant.user()) {
            return Err(ConfidentialError::DecryptionFailure(
                "grant signature does not recover to the grant user".into(),
            ));
        }

        // The node refuses the batch unless the user and each claimed
        // contract are on the handle's ACL.
        let wire: Vec<HandleContractPairWire> = pairs.iter().map(HandleContractPairWire::from).collect();
        let result = self
            .node
            .request("fhevm_getClearText", json!([wire, grant.user()]))
            .await
            .map_err(|e| match e {
                ConfidentialError::Rpc { code, message } => ConfidentialError::DecryptionFailure(
                    format!("node refused cleartext read ({}): {}", code, message),
                ),
                other => other,
            })?;
        let words = result.as_array().ok_or_else(|| {
            ConfidentialError::DecryptionFailure("cleartext response is not an array".into())
        })?;
        if words.len() != pairs.len() {
            return Err(ConfidentialError::DecryptionFailure(format!(
                "node returned {} cleartexts for {} handles",
                words.len(),
                pairs.len()
            )));
        }

        pairs
            .iter()
            .zip(words)
            .map(|(pair, word)| {
                let word = word
                    .as_str()
                    .and_then(|s| s.parse::<B256>().ok())
                    .ok_or_else(|| {
                        ConfidentialError::DecryptionFailure(format!(
                            "no cleartext for handle {}",
                            pair.handle
                        ))
                    })?;
                Ok((pair.handle, word))
            })
            .collect()
    }
}

impl fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBackend")
            .field("network", &self.network)
            .field("node", &self.node.describe())
            .field("metadata", &self.metadata)
            .field("gateway_chain_id", &self.gateway_chain_id)
            .field("coprocessor", &"[REDACTED]")
            .finish()
    }
}
