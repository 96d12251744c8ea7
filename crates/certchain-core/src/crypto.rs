use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use subtle::ConstantTimeEq;

use crate::error::{ConfidentialError, ConfidentialResult};

/// Length of an Ethereum-style recoverable signature: r ‖ s ‖ v.
pub const RECOVERABLE_SIGNATURE_LEN: usize = 65;

/// Derive an account address from a secp256k1 public key.
///
/// Formula: keccak256(uncompressed_pubkey[1..65])[12..32]
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Sign a 32-byte digest, returning `r ‖ s ‖ (27 + recovery_id)`.
pub fn sign_hash(key: &SigningKey, hash: &B256) -> ConfidentialResult<[u8; RECOVERABLE_SIGNATURE_LEN]> {
    let (sig, recid) = key
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|e| ConfidentialError::Signing(format!("ecdsa signing failed: {}", e)))?;
    let mut out = [0u8; RECOVERABLE_SIGNATURE_LEN];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = 27 + recid.to_byte();
    Ok(out)
}

/// Recover the signing address of a 65-byte signature over `hash`.
///
/// Accepts both `v ∈ {27, 28}` and raw recovery ids `{0, 1}`.
pub fn recover_signer(hash: &B256, signature: &[u8]) -> Option<Address> {
    if signature.len() != RECOVERABLE_SIGNATURE_LEN {
        return None;
    }
    let v = signature[64];
    let recid = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })?;
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recid).ok()?;
    Some(address_from_verifying_key(&key))
}

/// Whether `signature` over `hash` was produced by `expected`.
pub fn signer_matches(hash: &B256, signature: &[u8], expected: Address) -> bool {
    match recover_signer(hash, signature) {
        Some(addr) => bool::from(addr.as_slice().ct_eq(expected.as_slice())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_address_deterministic() {
        let k = key(0x42);
        assert_eq!(
            address_from_verifying_key(k.verifying_key()),
            address_from_verifying_key(k.verifying_key())
        );
        assert_ne!(
            address_from_verifying_key(key(0x01).verifying_key()),
            address_from_verifying_key(key(0x02).verifying_key())
        );
    }

    #[test]
    fn test_known_address() {
        // Well-known first development account.
        let k = SigningKey::from_slice(
            &hex::decode("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap(),
        )
        .unwrap();
        assert_eq!(
            address_from_verifying_key(k.verifying_key()),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let k = key(0x07);
        let hash = keccak256(b"message");
        let sig = sign_hash(&k, &hash).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
        let addr = address_from_verifying_key(k.verifying_key());
        assert_eq!(recover_signer(&hash, &sig), Some(addr));
        assert!(signer_matches(&hash, &sig, addr));
    }

    #[test]
    fn test_raw_recovery_id_accepted() {
        let k = key(0x08);
        let hash = keccak256(b"raw v");
        let mut sig = sign_hash(&k, &hash).unwrap();
        sig[64] -= 27;
        assert_eq!(
            recover_signer(&hash, &sig),
            Some(address_from_verifying_key(k.verifying_key()))
        );
    }

    #[test]
    fn test_wrong_hash_or_signer_rejected() {
        let k = key(0x09);
        let hash = keccak256(b"a");
        let sig = sign_hash(&k, &hash).unwrap();
        let addr = address_from_verifying_key(k.verifying_key());
        assert!(!signer_matches(&keccak256(b"b"), &sig, addr));
        assert!(!signer_matches(&hash, &sig, Address::repeat_byte(1)));
        assert!(!signer_matches(&hash, &sig[..64], addr));
    }
}
