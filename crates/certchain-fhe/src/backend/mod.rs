//! Encryption backends.
//!
//! A closed set: the simulated backend of a developer node, or the relayer
//! of a public deployment. Both expose the same capabilities and are
//! immutable once built, so a resolved backend is shared through `Arc`.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::Eip712Domain;
use certchain_core::eip712::{TypedDataRequest, TypedMessage, UserDecryptRequestVerification};
use certchain_core::{
    CiphertextHandle, ConfidentialResult, EndpointKind, HandleContractPair, InputField,
    NetworkContext,
};

use crate::grant::DecryptionGrant;

#[derive(Debug)]
pub enum EncryptionBackend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

impl EncryptionBackend {
    pub fn kind(&self) -> EndpointKind {
        match self {
            Self::Local(_) => EndpointKind::Local,
            Self::Remote(_) => EndpointKind::Remote,
        }
    }

    pub fn network(&self) -> &NetworkContext {
        match self {
            Self::Local(b) => b.network(),
            Self::Remote(b) => b.network(),
        }
    }

    /// Domain the user's decryption request is signed under.
    pub fn decryption_domain(&self) -> Eip712Domain {
        match self {
            Self::Local(b) => b.decryption_domain(),
            Self::Remote(b) => b.decryption_domain(),
        }
    }

    /// Build the typed grant message for the given key and scope. Pure: no
    /// signing and no network access.
    pub fn make_grant(
        &self,
        public_key: &[u8],
        contracts: &[Address],
        start_timestamp: u64,
        validity_days: u32,
    ) -> TypedDataRequest {
        UserDecryptRequestVerification::new(public_key, contracts, start_timestamp, validity_days)
            .typed_data(&self.decryption_domain())
    }

    /// Encrypt validated fields for `(contract, submitter)`, returning one
    /// handle per field (in field order) and the input proof.
    pub(crate) async fn encrypt(
        &self,
        contract: Address,
        submitter: Address,
        fields: &[InputField],
    ) -> ConfidentialResult<(Vec<CiphertextHandle>, Bytes)> {
        match self {
            Self::Local(b) => b.encrypt(contract, submitter, fields),
            Self::Remote(b) => b.encrypt(contract, submitter, fields).await,
        }
    }

    /// Exchange a signed grant for the plaintext words of `pairs`.
    pub(crate) async fn authorized_decrypt(
        &self,
        grant: &DecryptionGrant,
        pairs: &[HandleContractPair],
    ) -> ConfidentialResult<Vec<(CiphertextHandle, B256)>> {
        match self {
            Self::Local(b) => b.authorized_decrypt(grant, pairs).await,
            Self::Remote(b) => b.authorized_decrypt(grant, pairs).await,
        }
    }
}
