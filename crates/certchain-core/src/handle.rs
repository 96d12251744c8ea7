use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::FheType;

/// Index byte carried by handles the ledger computes itself.
pub const COMPUTED_INDEX: u8 = 0xff;
pub const HANDLE_VERSION: u8 = 0;

const INPUT_HANDLE_DOMAIN: &[u8] = b"ZK-w_hdl";

/// 32-byte opaque reference to a ciphertext held by the ledger's
/// encryption infrastructure.
///
/// Layout: `[0..21]` digest, `[21]` input index, `[22..30]` chain id
/// (big endian), `[30]` FHE type id, `[31]` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub B256);

impl CiphertextHandle {
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }

    pub fn index(&self) -> u8 {
        self.0[21]
    }

    pub fn is_computed(&self) -> bool {
        self.index() == COMPUTED_INDEX
    }

    pub fn chain_id(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[22..30]);
        u64::from_be_bytes(buf)
    }

    pub fn fhe_type(&self) -> Option<FheType> {
        FheType::from_id(self.0[30])
    }

    pub fn version(&self) -> u8 {
        self.0[31]
    }

    /// Stamp the metadata bytes onto a 32-byte digest.
    pub fn from_digest(digest: B256, index: u8, chain_id: u64, fhe_type: FheType) -> Self {
        let mut bytes = digest.0;
        bytes[21] = index;
        bytes[22..30].copy_from_slice(&chain_id.to_be_bytes());
        bytes[30] = fhe_type.id();
        bytes[31] = HANDLE_VERSION;
        Self(B256::from(bytes))
    }

    /// A handle for a value produced on-ledger rather than supplied as input.
    pub fn computed(seed: &[u8], fhe_type: FheType, chain_id: u64) -> Self {
        Self::from_digest(keccak256(seed), COMPUTED_INDEX, chain_id, fhe_type)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<B256> for CiphertextHandle {
    fn from(b: B256) -> Self {
        Self(b)
    }
}

/// Derive the input handles for one ciphertext blob, one per packed field.
///
/// The digest commits to the blob, the field index, the ACL contract and the
/// chain, so the same blob yields distinct handles on distinct deployments.
pub fn derive_input_handles(
    ciphertext: &[u8],
    acl: Address,
    chain_id: u64,
    types: &[FheType],
) -> Vec<CiphertextHandle> {
    let blob_hash = keccak256(ciphertext);
    let chain_word = U256::from(chain_id).to_be_bytes::<32>();
    types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let index = i as u8;
            let mut preimage = Vec::with_capacity(INPUT_HANDLE_DOMAIN.len() + 32 + 1 + 20 + 32);
            preimage.extend_from_slice(INPUT_HANDLE_DOMAIN);
            preimage.extend_from_slice(blob_hash.as_slice());
            preimage.push(index);
            preimage.extend_from_slice(acl.as_slice());
            preimage.extend_from_slice(&chain_word);
            CiphertextHandle::from_digest(keccak256(&preimage), index, chain_id, *ty)
        })
        .collect()
}
