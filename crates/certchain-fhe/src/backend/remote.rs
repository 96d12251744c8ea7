use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::Eip712Domain;
use certchain_core::eip712::decryption_domain;
use certchain_core::proof::{InputProof, EXTRA_DATA_NONE};
use certchain_core::seal::{open, seal};
use certchain_core::wire::{
    decode_decrypted_payload, encode_packed_inputs, input_seal_aad, share_seal_aad,
    HandleContractPairWire, InputKeyInfo, InputProofRequest, InputProofResponse, RequestValidity,
    UserDecryptRequest, UserDecryptShare,
};
use certchain_core::{
    CiphertextHandle, ConfidentialError, ConfidentialResult, EndpointKind, HandleContractPair,
    InputField, NetworkContext, NetworkTransport, HANDLE_VERSION,
};
use std::fmt;
use std::sync::Arc;

use crate::config::RelayerConfig;
use crate::grant::DecryptionGrant;
use crate::loader::RelayerClient;

/// Relayer-backed encryption for a public deployment.
///
/// Inputs are sealed to the relayer's input key and attested by its
/// coprocessors. Decryption shares come back sealed to the grant's
/// ephemeral public key and are opened locally.
pub struct RemoteBackend {
    network: NetworkContext,
    config: RelayerConfig,
    client: &'static RelayerClient,
    input_key: InputKeyInfo,
    transport: Arc<dyn NetworkTransport>,
}

impl RemoteBackend {
    /// Instantiate the loaded relayer client against `config`, with
    /// `transport` as the network binding.
    pub async fn connect(
        config: RelayerConfig,
        client: &'static RelayerClient,
        transport: Arc<dyn NetworkTransport>,
    ) -> ConfidentialResult<Self> {
        let input_key: InputKeyInfo = client.get(&config.url, "/v1/keyurl").await.map_err(|e| {
            ConfidentialError::BackendUnavailable(format!("relayer {}: {}", config.url, e))
        })?;
        if input_key.public_key.is_empty() {
            return Err(ConfidentialError::BackendUnavailable(format!(
                "relayer {} published an empty input key",
                config.url
            )));
        }
        let network = NetworkContext {
            chain_id: config.chain_id,
            endpoint_kind: EndpointKind::Remote,
            rpc_target: transport.describe(),
        };
        tracing::debug!(relayer = %config.url, key_id = %input_key.key_id, "relayer input key fetched");
        Ok(Self {
            network,
            config,
            client,
            input_key,
            transport,
        })
    }

    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    pub fn config(&self) -> &RelayerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn NetworkTransport> {
        &self.transport
    }

    pub fn decryption_domain(&self) -> Eip712Domain {
        decryption_domain(
            self.config.gateway_chain_id,
            self.config.verifying_contract_decryption,
        )
    }

    pub(crate) async fn encrypt(
        &self,
        contract: Address,
        submitter: Address,
        fields: &[InputField],
    ) -> ConfidentialResult<(Vec<CiphertextHandle>, Bytes)> {
        let chain_id = self.network.chain_id;
        let packed = encode_packed_inputs(fields);
        let sealed = seal(
            &self.input_key.public_key,
            &packed,
            &input_seal_aad(contract, submitter, chain_id),
        )
        .map_err(|e| ConfidentialError::EncryptionFailure(format!("sealing input: {}", e)))?;

        let request = InputProofRequest {
            contract_address: contract,
            user_address: submitter,
            ciphertext_with_input_verification: Bytes::from(sealed),
            contract_chain_id: format!("{:#x}", chain_id),
            extra_data: Bytes::from(vec![EXTRA_DATA_NONE]),
        };
        let response: InputProofResponse = self
            .client
            .post(&self.config.url, "/v1/input-proof", &request)
            .await
            .map_err(|e| ConfidentialError::EncryptionFailure(e.to_string()))?;

        check_input_handles(&response.handles, fields, chain_id)?;
        if response.signatures.is_empty() {
            return Err(ConfidentialError::EncryptionFailure(
                "relayer returned no coprocessor signatures".into(),
            ));
        }

        let proof = InputProof {
            handles: response.handles.clone(),
            signatures: response.signatures,
            extra_data: request.extra_data,
        }
        .encode()
        .map_err(|e| ConfidentialError::EncryptionFailure(e.to_string()))?;

        tracing::debug!(
            contract = %contract,
            submitter = %submitter,
            handles = response.handles.len(),
            "relayer input proof received"
        );
        Ok((response.handles, proof))
    }

    pub(crate) async fn authorized_decrypt(
        &self,
        grant: &DecryptionGrant,
        pairs: &[HandleContractPair],
    ) -> ConfidentialResult<Vec<(CiphertextHandle, B256)>> {
        let request = UserDecryptRequest {
            handle_contract_pairs: pairs.iter().map(HandleContractPairWire::from).collect(),
            request_validity: RequestValidity {
                start_timestamp: grant.issued_at().to_string(),
                duration_days: grant.validity_days().to_string(),
            },
            contracts_chain_id: self.network.chain_id.to_string(),
            contract_addresses: grant.contracts().iter().copied().collect(),
            user_address: grant.user(),
            signature: grant.signature().clone(),
            public_key: grant.public_key().clone(),
            extra_data: Bytes::from(vec![EXTRA_DATA_NONE]),
        };
        let shares: Vec<UserDecryptShare> = self
            .client
            .post(&self.config.url, "/v1/user-decrypt", &request)
            .await?;
        if shares.is_empty() {
            return Err(ConfidentialError::DecryptionFailure(
                "relayer returned no decryption shares".into(),
            ));
        }

        let aad = share_seal_aad(grant.user());
        let mut agreed: Option<Vec<(CiphertextHandle, B256)>> = None;
        for (i, share) in shares.iter().enumerate() {
            let plaintext = open(grant.secret_key(), &share.payload, &aad).map_err(|e| {
                ConfidentialError::DecryptionFailure(format!("share {}: {}", i, e))
            })?;
            let entries = decode_decrypted_payload(&plaintext).map_err(|e| {
                ConfidentialError::DecryptionFailure(format!("share {}: {}", i, e))
            })?;
            match &agreed {
                None => agreed = Some(entries),
                Some(first) if *first == entries => {}
                Some(_) => {
                    return Err(ConfidentialError::DecryptionFailure(format!(
                        "decryption share {} disagrees with share 0",
                        i
                    )))
                }
            }
        }
        tracing::debug!(shares = shares.len(), handles = pairs.len(), "decryption shares opened");
        Ok(agreed.unwrap_or_default())
    }
}

/// Handles returned by the relayer must line up with the submitted fields.
fn check_input_handles(
    handles: &[CiphertextHandle],
    fields: &[InputField],
    chain_id: u64,
) -> ConfidentialResult<()> {
    if handles.len() != fields.len() {
        return Err(ConfidentialError::EncryptionFailure(format!(
            "relayer returned {} handles for {} fields",
            handles.len(),
            fields.len()
        )));
    }
    for (i, (handle, field)) in handles.iter().zip(fields).enumerate() {
        let consistent = handle.index() as usize == i
            && handle.fhe_type() == Some(field.fhe_type)
            && handle.chain_id() == chain_id
            && handle.version() == HANDLE_VERSION;
        if !consistent {
            return Err(ConfidentialError::EncryptionFailure(format!(
                "relayer handle {} does not match field {} ({})",
                handle, i, field.fhe_type
            )));
        }
    }
    Ok(())
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("network", &self.network)
            .field("relayer", &self.config.url)
            .field("input_key_id", &self.input_key.key_id)
            .finish()
    }
}
