use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use std::fmt;

use crate::crypto::{address_from_verifying_key, sign_hash};
use crate::eip712::TypedDataRequest;
use crate::error::{ConfidentialError, ConfidentialResult};
use crate::traits::{IdentitySigner, SignError};

/// In-process secp256k1 account that signs typed data by digest.
///
/// `SigningKey` zeroes its scalar on drop.
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
}

impl LocalKeySigner {
    pub fn from_slice(bytes: &[u8]) -> ConfidentialResult<Self> {
        let key = SigningKey::from_slice(bytes)
            .map_err(|e| ConfidentialError::Signing(format!("invalid private key: {}", e)))?;
        let address = address_from_verifying_key(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a `0x`-prefixed or bare hex private key.
    pub fn from_hex(s: &str) -> ConfidentialResult<Self> {
        let raw = s.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = zeroize::Zeroizing::new(
            hex::decode(raw)
                .map_err(|e| ConfidentialError::Signing(format!("invalid private key hex: {}", e)))?,
        );
        Self::from_slice(&bytes)
    }

    pub fn random() -> Self {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl IdentitySigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, request: &TypedDataRequest) -> Result<Bytes, SignError> {
        let sig = sign_hash(&self.key, &request.signing_hash)
            .map_err(|e| SignError::Failed(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::recover_signer;
    use crate::eip712::{decryption_domain, TypedMessage, UserDecryptRequestVerification};

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_from_hex() {
        let signer = LocalKeySigner::from_hex(DEV_KEY).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        let bare = LocalKeySigner::from_hex(&DEV_KEY[2..]).unwrap();
        assert_eq!(signer.address(), bare.address());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(LocalKeySigner::from_hex("0xzz").is_err());
        assert!(LocalKeySigner::from_slice(&[0u8; 32]).is_err());
        assert!(LocalKeySigner::from_slice(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let dbg = format!("{:?}", LocalKeySigner::random());
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("ac0974"));
    }

    #[tokio::test]
    async fn test_signature_recovers_to_address() {
        let signer = LocalKeySigner::random();
        let msg = UserDecryptRequestVerification::new(&[2u8; 33], &[Address::repeat_byte(1)], 10, 1);
        let req = msg.typed_data(&decryption_domain(55815, Address::repeat_byte(2)));
        let sig = signer.sign_typed_data(&req).await.unwrap();
        assert_eq!(sig.len(), 65);
        assert_eq!(recover_signer(&req.signing_hash, &sig), Some(signer.address()));
    }
}
