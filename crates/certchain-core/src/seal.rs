use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use hkdf::Hkdf;
use k256::ecdh::{diffie_hellman, EphemeralSecret};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

// Sealed box to a secp256k1 public key.
//
// An ephemeral key agrees a shared secret with the recipient, HKDF-SHA256
// stretches it into an AES-256-GCM key, and the caller's associated data is
// authenticated alongside the ciphertext.
//
// Layout: ephemeral_pubkey (33, compressed) ‖ nonce (12) ‖ ciphertext + tag

const EPHEMERAL_KEY_SIZE: usize = 33;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KDF_INFO: &[u8] = b"certchain/seal/v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("sealed payload too short: {0} bytes")]
    TooShort(usize),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encryption,

    #[error("sealed payload failed authentication")]
    Authentication,
}

pub type SealResult<T> = Result<T, SealError>;

fn derive_key(
    shared: &[u8],
    ephemeral: &[u8],
    recipient: &[u8],
) -> SealResult<Zeroizing<[u8; 32]>> {
    let mut salt = Vec::with_capacity(ephemeral.len() + recipient.len());
    salt.extend_from_slice(ephemeral);
    salt.extend_from_slice(recipient);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(KDF_INFO, key.as_mut_slice())
        .map_err(|_| SealError::KeyDerivation)?;
    Ok(key)
}

/// Seal `plaintext` so that only the holder of the secret key matching
/// `recipient` (SEC1 bytes, compressed or not) can open it.
pub fn seal(recipient: &[u8], plaintext: &[u8], aad: &[u8]) -> SealResult<Vec<u8>> {
    let recipient_key =
        PublicKey::from_sec1_bytes(recipient).map_err(|_| SealError::InvalidPublicKey)?;
    let recipient_bytes = recipient_key.to_encoded_point(true);

    let ephemeral = EphemeralSecret::random(&mut rand::rngs::OsRng);
    let ephemeral_pub = ephemeral.public_key().to_encoded_point(true);
    let shared = ephemeral.diffie_hellman(&recipient_key);

    let key = derive_key(
        shared.raw_secret_bytes().as_slice(),
        ephemeral_pub.as_bytes(),
        recipient_bytes.as_bytes(),
    )?;
    let cipher = Aes256Gcm::new_from_slice(&*key).map_err(|_| SealError::Encryption)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            AesNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| SealError::Encryption)?;

    let mut out = Vec::with_capacity(EPHEMERAL_KEY_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a payload produced by [`seal`] with the recipient's secret key.
pub fn open(secret: &SecretKey, sealed: &[u8], aad: &[u8]) -> SealResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < EPHEMERAL_KEY_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(SealError::TooShort(sealed.len()));
    }
    let (ephemeral_bytes, rest) = sealed.split_at(EPHEMERAL_KEY_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let ephemeral_pub =
        PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| SealError::InvalidPublicKey)?;
    let recipient_bytes = secret.public_key().to_encoded_point(true);
    let shared = diffie_hellman(secret.to_nonzero_scalar(), ephemeral_pub.as_affine());

    let key = derive_key(
        shared.raw_secret_bytes().as_slice(),
        ephemeral_bytes,
        recipient_bytes.as_bytes(),
    )?;
    let cipher = Aes256Gcm::new_from_slice(&*key).map_err(|_| SealError::Authentication)?;

    cipher
        .decrypt(
            AesNonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| SealError::Authentication)
}
