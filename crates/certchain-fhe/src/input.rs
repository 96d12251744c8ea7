use alloy_primitives::{Address, Bytes, U256};
use certchain_core::{
    CiphertextHandle, ConfidentialError, ConfidentialResult, CredentialSubmission, FheType,
    InputField,
};
use std::sync::Arc;

use crate::backend::EncryptionBackend;

/// Packing capacity of a single encrypted input.
pub const MAX_INPUT_BITS: usize = 2048;
/// Handle count is carried in one byte of the proof.
pub const MAX_INPUT_FIELDS: usize = 255;

/// Collects typed plaintext fields for one `(contract, submitter)` pair.
///
/// Field order is preserved: the n-th handle of the bundle encrypts the n-th
/// field added. [`encrypt`](Self::encrypt) consumes the builder.
#[derive(Debug)]
pub struct EncryptedInputBuilder {
    backend: Arc<EncryptionBackend>,
    contract: Address,
    submitter: Address,
    fields: Vec<InputField>,
}

impl EncryptedInputBuilder {
    pub fn new(backend: Arc<EncryptionBackend>, contract: Address, submitter: Address) -> Self {
        Self {
            backend,
            contract,
            submitter,
            fields: Vec::new(),
        }
    }

    pub fn add(&mut self, field: InputField) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn add_bool(&mut self, v: bool) -> &mut Self {
        self.add(InputField::bool(v))
    }

    pub fn add_uint8(&mut self, v: u8) -> &mut Self {
        self.add(InputField::uint(FheType::Uint8, U256::from(v)))
    }

    pub fn add_uint16(&mut self, v: u16) -> &mut Self {
        self.add(InputField::uint(FheType::Uint16, U256::from(v)))
    }

    pub fn add_uint32(&mut self, v: u32) -> &mut Self {
        self.add(InputField::uint32(v))
    }

    pub fn add_uint64(&mut self, v: u64) -> &mut Self {
        self.add(InputField::uint64(v))
    }

    pub fn add_uint128(&mut self, v: u128) -> &mut Self {
        self.add(InputField::uint(FheType::Uint128, U256::from(v)))
    }

    pub fn add_uint256(&mut self, v: U256) -> &mut Self {
        self.add(InputField::uint(FheType::Uint256, v))
    }

    pub fn add_address(&mut self, v: Address) -> &mut Self {
        self.add(InputField::address(v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn packed_bits(&self) -> usize {
        self.fields.iter().map(|f| f.fhe_type.packed_bits()).sum()
    }

    /// Encrypt every field and obtain the proof. Any failure surfaces as
    /// `EncryptionFailure`; the builder is consumed either way.
    pub async fn encrypt(self) -> ConfidentialResult<EncryptedInputBundle> {
        self.validate()?;
        let (handles, proof) = self
            .backend
            .encrypt(self.contract, self.submitter, &self.fields)
            .await
            .map_err(|e| match e {
                ConfidentialError::EncryptionFailure(_) => e,
                other => ConfidentialError::EncryptionFailure(other.to_string()),
            })?;
        if handles.len() != self.fields.len() {
            return Err(ConfidentialError::EncryptionFailure(format!(
                "backend returned {} handles for {} fields",
                handles.len(),
                self.fields.len()
            )));
        }
        tracing::info!(
            backend = %self.backend.kind(),
            contract = %self.contract,
            fields = self.fields.len(),
            "encrypted input built"
        );
        Ok(EncryptedInputBundle {
            target_contract: self.contract,
            submitter: self.submitter,
            handles,
            proof,
        })
    }

    fn validate(&self) -> ConfidentialResult<()> {
        if self.fields.is_empty() {
            return Err(ConfidentialError::EncryptionFailure(
                "encrypted input has no fields".into(),
            ));
        }
        if self.fields.len() > MAX_INPUT_FIELDS {
            return Err(ConfidentialError::EncryptionFailure(format!(
                "encrypted input has {} fields, at most {} allowed",
                self.fields.len(),
                MAX_INPUT_FIELDS
            )));
        }
        let bits = self.packed_bits();
        if bits > MAX_INPUT_BITS {
            return Err(ConfidentialError::EncryptionFailure(format!(
                "encrypted input packs {} bits, at most {} allowed",
                bits, MAX_INPUT_BITS
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            field.validate().map_err(|e| {
                ConfidentialError::EncryptionFailure(format!("field {}: {}", i, e))
            })?;
        }
        Ok(())
    }
}

/// Encrypt `fields` in order for `(contract, submitter)`.
pub async fn build(
    backend: Arc<EncryptionBackend>,
    contract: Address,
    submitter: Address,
    fields: impl IntoIterator<Item = InputField>,
) -> ConfidentialResult<EncryptedInputBundle> {
    let mut builder = EncryptedInputBuilder::new(backend, contract, submitter);
    for field in fields {
        builder.add(field);
    }
    builder.encrypt().await
}

/// Handles plus the proof that binds them to one contract and submitter.
/// Deliberately not `Clone`: a bundle is submitted once.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedInputBundle {
    target_contract: Address,
    submitter: Address,
    handles: Vec<CiphertextHandle>,
    proof: Bytes,
}

impl EncryptedInputBundle {
    pub fn target_contract(&self) -> Address {
        self.target_contract
    }

    pub fn submitter(&self) -> Address {
        self.submitter
    }

    pub fn handles(&self) -> &[CiphertextHandle] {
        &self.handles
    }

    pub fn proof(&self) -> &Bytes {
        &self.proof
    }

    pub fn into_parts(self) -> (Vec<CiphertextHandle>, Bytes) {
        (self.handles, self.proof)
    }

    /// Turn a single-field bundle (the course tag) into issuance arguments.
    pub fn into_submission(
        self,
        recipient: Address,
        metadata_uri: impl Into<String>,
        valid_until: u64,
    ) -> ConfidentialResult<CredentialSubmission> {
        let [encrypted_tag] = self.handles[..] else {
            return Err(ConfidentialError::EncryptionFailure(format!(
                "credential submission takes exactly one encrypted field, bundle has {}",
                self.handles.len()
            )));
        };
        Ok(CredentialSubmission {
            recipient,
            metadata_uri: metadata_uri.into(),
            valid_until,
            encrypted_tag,
            proof: self.proof,
        })
    }
}
