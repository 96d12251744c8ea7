//! Input proof byte layout.
//!
//! `[n_handles u8][n_signers u8][handles 32B each][signatures 65B each][extra_data]`
//!
//! The first byte of `extra_data` selects its interpretation: [`EXTRA_DATA_NONE`]
//! for production proofs, [`EXTRA_DATA_CLEARTEXTS`] when the simulated backend
//! appends the plaintext words so a developer node can register them.

use alloy_primitives::{Bytes, B256};
use thiserror::Error;

use crate::handle::CiphertextHandle;

pub const SIGNATURE_LEN: usize = 65;
pub const EXTRA_DATA_NONE: u8 = 0x00;
pub const EXTRA_DATA_CLEARTEXTS: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofDecodeError {
    #[error("proof truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("proof has no handles")]
    Empty,

    #[error("too many {0} for a single proof")]
    TooMany(&'static str),

    #[error("signature has {0} bytes, expected 65")]
    BadSignatureLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProof {
    pub handles: Vec<CiphertextHandle>,
    pub signatures: Vec<Bytes>,
    pub extra_data: Bytes,
}

impl InputProof {
    pub fn encode(&self) -> Result<Bytes, ProofDecodeError> {
        let n_handles =
            u8::try_from(self.handles.len()).map_err(|_| ProofDecodeError::TooMany("handles"))?;
        let n_signers = u8::try_from(self.signatures.len())
            .map_err(|_| ProofDecodeError::TooMany("signatures"))?;
        if n_handles == 0 {
            return Err(ProofDecodeError::Empty);
        }

        let mut out = Vec::with_capacity(
            2 + self.handles.len() * 32 + self.signatures.len() * SIGNATURE_LEN + self.extra_data.len(),
        );
        out.push(n_handles);
        out.push(n_signers);
        for h in &self.handles {
            out.extend_from_slice(h.0.as_slice());
        }
        for sig in &self.signatures {
            if sig.len() != SIGNATURE_LEN {
                return Err(ProofDecodeError::BadSignatureLength(sig.len()));
            }
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.extra_data);
        Ok(Bytes::from(out))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProofDecodeError> {
        if bytes.len() < 2 {
            return Err(ProofDecodeError::Truncated {
                needed: 2,
                have: bytes.len(),
            });
        }
        let n_handles = bytes[0] as usize;
        let n_signers = bytes[1] as usize;
        if n_handles == 0 {
            return Err(ProofDecodeError::Empty);
        }
        let needed = 2 + n_handles * 32 + n_signers * SIGNATURE_LEN;
        if bytes.len() < needed {
            return Err(ProofDecodeError::Truncated {
                needed,
                have: bytes.len(),
            });
        }

        let mut offset = 2;
        let handles = (0..n_handles)
            .map(|_| {
                let h = CiphertextHandle(B256::from_slice(&bytes[offset..offset + 32]));
                offset += 32;
                h
            })
            .collect();
        let signatures = (0..n_signers)
            .map(|_| {
                let s = Bytes::copy_from_slice(&bytes[offset..offset + SIGNATURE_LEN]);
                offset += SIGNATURE_LEN;
                s
            })
            .collect();

        Ok(Self {
            handles,
            signatures,
            extra_data: Bytes::copy_from_slice(&bytes[offset..]),
        })
    }

    /// Plaintext words appended by the simulated backend, one per handle.
    pub fn mock_cleartexts(&self) -> Option<Vec<B256>> {
        let (tag, rest) = self.extra_data.split_first()?;
        if *tag != EXTRA_DATA_CLEARTEXTS || rest.len() != self.handles.len() * 32 {
            return None;
        }
        Some(rest.chunks_exact(32).map(B256::from_slice).collect())
    }
}

/// `extra_data` carrying plaintext words for a developer node.
pub fn cleartext_extra_data(words: &[B256]) -> Bytes {
    let mut out = Vec::with_capacity(1 + words.len() * 32);
    out.push(EXTRA_DATA_CLEARTEXTS);
    for w in words {
        out.extend_from_slice(w.as_slice());
    }
    Bytes::from(out)
}
