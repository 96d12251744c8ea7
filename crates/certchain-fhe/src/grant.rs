//! Decryption grants.
//!
//! A grant is a fresh ephemeral keypair plus the user's signature over
//! `(public key, contracts, start, validity)`. It is built in two steps: a
//! pure [`UnsignedGrant`] message, then the signature. A [`DecryptionGrant`]
//! therefore only exists once signing has completed.

use alloy_primitives::{Address, Bytes};
use certchain_core::eip712::{TypedDataRequest, UserDecryptRequestVerification};
use certchain_core::{
    CiphertextHandle, ClearValue, ConfidentialError, ConfidentialResult, HandleContractPair,
    IdentitySigner, Timestamp, B256,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::backend::EncryptionBackend;

pub const MAX_VALIDITY_DAYS: u32 = 365;

// ---------------------------------------------------------------------------
// EphemeralKeypair
// ---------------------------------------------------------------------------

/// secp256k1 keypair generated per grant. The secret scalar is zeroed when
/// the keypair drops and is never serialized.
pub struct EphemeralKeypair {
    secret: SecretKey,
    public: Bytes,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let public = Bytes::copy_from_slice(secret.public_key().to_encoded_point(true).as_bytes());
        Self { secret, public }
    }

    /// Compressed SEC1 public key.
    pub fn public_key(&self) -> &Bytes {
        &self.public
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GrantPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantPolicy {
    validity_days: u32,
}

impl GrantPolicy {
    pub fn new(validity_days: u32) -> ConfidentialResult<Self> {
        check_validity(validity_days)?;
        Ok(Self { validity_days })
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            validity_days: MAX_VALIDITY_DAYS,
        }
    }
}

fn check_validity(days: u32) -> ConfidentialResult<()> {
    if days == 0 || days > MAX_VALIDITY_DAYS {
        return Err(ConfidentialError::InvalidGrant(format!(
            "validity must be between 1 and {} days, got {}",
            MAX_VALIDITY_DAYS, days
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// UnsignedGrant: the canonical message, before any signature exists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedGrant {
    user: Address,
    public_key: Bytes,
    contracts: BTreeSet<Address>,
    start_timestamp: u64,
    validity_days: u32,
    request: TypedDataRequest,
}

impl UnsignedGrant {
    pub fn user(&self) -> Address {
        self.user
    }

    pub fn contracts(&self) -> &BTreeSet<Address> {
        &self.contracts
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }

    pub fn expires_at(&self) -> u64 {
        Timestamp::from_seconds(self.start_timestamp)
            .plus_days(self.validity_days)
            .seconds_since_epoch
    }

    /// Contracts are listed in ascending address order.
    pub fn message(&self) -> UserDecryptRequestVerification {
        let contracts: Vec<Address> = self.contracts.iter().copied().collect();
        UserDecryptRequestVerification::new(
            &self.public_key,
            &contracts,
            self.start_timestamp,
            self.validity_days,
        )
    }

    /// What the wallet is asked to sign, as built by the backend.
    pub fn typed_data(&self) -> TypedDataRequest {
        self.request.clone()
    }
}

/// Build the message a user signs to authorize decryption. No signing and
/// no network access happen here.
pub fn prepare_grant(
    backend: &EncryptionBackend,
    user: Address,
    keypair: &EphemeralKeypair,
    contracts: &[Address],
    start_timestamp: u64,
    policy: GrantPolicy,
) -> ConfidentialResult<UnsignedGrant> {
    check_validity(policy.validity_days)?;
    let contracts: BTreeSet<Address> = contracts.iter().copied().collect();
    if contracts.is_empty() {
        return Err(ConfidentialError::InvalidGrant(
            "a grant must authorize at least one contract".into(),
        ));
    }
    let listed: Vec<Address> = contracts.iter().copied().collect();
    let request = backend.make_grant(
        keypair.public_key(),
        &listed,
        start_timestamp,
        policy.validity_days,
    );
    Ok(UnsignedGrant {
        user,
        public_key: keypair.public_key().clone(),
        contracts,
        start_timestamp,
        validity_days: policy.validity_days,
        request,
    })
}

// ---------------------------------------------------------------------------
// DecryptionGrant
// ---------------------------------------------------------------------------

pub struct DecryptionGrant {
    unsigned: UnsignedGrant,
    keypair: EphemeralKeypair,
    signature: Bytes,
}

impl DecryptionGrant {
    pub fn user(&self) -> Address {
        self.unsigned.user
    }

    pub fn contracts(&self) -> &BTreeSet<Address> {
        &self.unsigned.contracts
    }

    pub fn public_key(&self) -> &Bytes {
        self.keypair.public_key()
    }

    pub fn issued_at(&self) -> u64 {
        self.unsigned.start_timestamp
    }

    pub fn validity_days(&self) -> u32 {
        self.unsigned.validity_days
    }

    pub fn expires_at(&self) -> u64 {
        self.unsigned.expires_at()
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn request_message(&self) -> UserDecryptRequestVerification {
        self.unsigned.message()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.keypair.secret
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.unsigned.contracts.contains(contract)
    }

    /// Expired from `expires_at` onwards.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    /// Scope first, then expiry. Runs before any network request.
    pub fn check_batch(&self, pairs: &[HandleContractPair], now: u64) -> ConfidentialResult<()> {
        if let Some(outside) = pairs.iter().find(|p| !self.covers(&p.contract)) {
            return Err(ConfidentialError::GrantScopeMismatch(outside.contract));
        }
        if self.is_expired_at(now) {
            return Err(ConfidentialError::GrantExpired {
                expired_at: self.expires_at(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for DecryptionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionGrant")
            .field("user", &self.unsigned.user)
            .field("contracts", &self.unsigned.contracts)
            .field("issued_at", &self.unsigned.start_timestamp)
            .field("validity_days", &self.unsigned.validity_days)
            .field("keypair", &self.keypair)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Authorize decryption for `contracts` with the default (maximum) validity.
pub async fn authorize(
    backend: &EncryptionBackend,
    signer: &dyn IdentitySigner,
    contracts: &[Address],
) -> ConfidentialResult<DecryptionGrant> {
    authorize_with_policy(backend, signer, contracts, GrantPolicy::default()).await
}

pub async fn authorize_with_policy(
    backend: &EncryptionBackend,
    signer: &dyn IdentitySigner,
    contracts: &[Address],
    policy: GrantPolicy,
) -> ConfidentialResult<DecryptionGrant> {
    let keypair = EphemeralKeypair::generate();
    let start = Timestamp::now().seconds_since_epoch;
    let unsigned = prepare_grant(backend, signer.address(), &keypair, contracts, start, policy)?;
    let request = unsigned.typed_data();

    let signature = signer.sign_typed_data(&request).await?;
    tracing::info!(
        user = %unsigned.user,
        contracts = unsigned.contracts.len(),
        validity_days = unsigned.validity_days,
        "decryption grant signed"
    );
    Ok(sign_grant(unsigned, keypair, signature))
}

/// Pair an unsigned message with its signature.
pub fn sign_grant(unsigned: UnsignedGrant, keypair: EphemeralKeypair, signature: Bytes) -> DecryptionGrant {
    DecryptionGrant {
        unsigned,
        keypair,
        signature,
    }
}

/// Decrypt a batch of handles. All or nothing: any failure for any handle
/// fails the batch and no plaintext is returned.
pub async fn decrypt(
    backend: &EncryptionBackend,
    grant: &DecryptionGrant,
    pairs: &[HandleContractPair],
) -> ConfidentialResult<HashMap<CiphertextHandle, ClearValue>> {
    let pairs = dedup_pairs(pairs);
    if pairs.is_empty() {
        return Ok(HashMap::new());
    }
    grant.check_batch(&pairs, Timestamp::now().seconds_since_epoch)?;

    let words = backend
        .authorized_decrypt(grant, &pairs)
        .await
        .map_err(|e| match e {
            ConfidentialError::DecryptionFailure(_) => e,
            other => ConfidentialError::DecryptionFailure(other.to_string()),
        })?;
    let values = collect_cleartexts(&pairs, words)?;
    tracing::info!(
        user = %grant.user(),
        handles = values.len(),
        "handles decrypted"
    );
    Ok(values)
}

fn dedup_pairs(pairs: &[HandleContractPair]) -> Vec<HandleContractPair> {
    let mut seen = HashSet::new();
    pairs.iter().filter(|p| seen.insert(**p)).copied().collect()
}

/// Match returned words to requested handles and type them by each handle's
/// declared FHE type. Missing, unexpected or repeated handles reject the
/// whole batch.
pub fn collect_cleartexts(
    pairs: &[HandleContractPair],
    words: Vec<(CiphertextHandle, B256)>,
) -> ConfidentialResult<HashMap<CiphertextHandle, ClearValue>> {
    let requested: HashSet<CiphertextHandle> = pairs.iter().map(|p| p.handle).collect();
    let mut out = HashMap::with_capacity(requested.len());

    for (handle, word) in words {
        if !requested.contains(&handle) {
            return Err(ConfidentialError::DecryptionFailure(format!(
                "unexpected handle {} in result",
                handle
            )));
        }
        let ty = handle.fhe_type().ok_or_else(|| {
            ConfidentialError::DecryptionFailure(format!("handle {} has unknown type", handle))
        })?;
        let value = ClearValue::from_word(ty, &word).map_err(|e| {
            ConfidentialError::DecryptionFailure(format!("handle {}: {}", handle, e))
        })?;
        if out.insert(handle, value).is_some() {
            return Err(ConfidentialError::DecryptionFailure(format!(
                "handle {} returned twice",
                handle
            )));
        }
    }

    if out.len() != requested.len() {
        return Err(ConfidentialError::DecryptionFailure(format!(
            "{} of {} handles missing from result",
            requested.len() - out.len(),
            requested.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::eip712::{decryption_domain, TypedMessage};
    use certchain_core::{FheType, U256};

    fn handle(seed: u8, ty: FheType) -> CiphertextHandle {
        CiphertextHandle::from_digest(B256::repeat_byte(seed), 0, 31337, ty)
    }

    fn unsigned(contracts: &[Address], start: u64, days: u32) -> UnsignedGrant {
        let public_key = Bytes::from(vec![2u8; 33]);
        let contracts: BTreeSet<Address> = contracts.iter().copied().collect();
        let listed: Vec<Address> = contracts.iter().copied().collect();
        let request = UserDecryptRequestVerification::new(&public_key, &listed, start, days)
            .typed_data(&decryption_domain(55815, Address::repeat_byte(0xb6)));
        UnsignedGrant {
            user: Address::repeat_byte(0xaa),
            public_key,
            contracts,
            start_timestamp: start,
            validity_days: days,
            request,
        }
    }

    fn grant(contracts: &[Address], start: u64, days: u32) -> DecryptionGrant {
        sign_grant(
            unsigned(contracts, start, days),
            EphemeralKeypair::generate(),
            Bytes::from(vec![0u8; 65]),
        )
    }

    #[test]
    fn test_policy_bounds() {
        assert!(GrantPolicy::new(0).is_err());
        assert!(GrantPolicy::new(366).is_err());
        assert_eq!(GrantPolicy::new(1).unwrap().validity_days(), 1);
        assert_eq!(GrantPolicy::default().validity_days(), 365);
    }

    #[test]
    fn test_keypairs_are_fresh() {
        let a = EphemeralKeypair::generate();
        let b = EphemeralKeypair::generate();
        assert_ne!(a.public_key(), b.public_key());
        assert_eq!(a.public_key().len(), 33);
        assert!(format!("{:?}", a).contains("REDACTED"));
    }

    #[test]
    fn test_message_lists_contracts_in_order() {
        let c1 = Address::repeat_byte(1);
        let c2 = Address::repeat_byte(2);
        let msg = unsigned(&[c2, c1, c2], 100, 10).message();
        assert_eq!(msg.contractAddresses, vec![c1, c2]);
        assert_eq!(msg.durationDays, U256::from(10u32));
        assert_eq!(msg.startTimestamp, U256::from(100u64));
    }

    #[test]
    fn test_scope_checked_before_expiry() {
        let allowed = Address::repeat_byte(1);
        let other = Address::repeat_byte(2);
        let g = grant(&[allowed], 0, 1);
        let pairs = [
            HandleContractPair::new(handle(1, FheType::Bool), allowed),
            HandleContractPair::new(handle(2, FheType::Bool), other),
        ];
        // Both out of scope and expired: scope wins.
        assert_eq!(
            g.check_batch(&pairs, u64::MAX),
            Err(ConfidentialError::GrantScopeMismatch(other))
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let c = Address::repeat_byte(1);
        let g = grant(&[c], 1_000, 1);
        let pairs = [HandleContractPair::new(handle(1, FheType::Bool), c)];
        let expires = 1_000 + 86_400;
        assert_eq!(g.expires_at(), expires);
        assert!(g.check_batch(&pairs, expires - 1).is_ok());
        assert_eq!(
            g.check_batch(&pairs, expires),
            Err(ConfidentialError::GrantExpired { expired_at: expires })
        );
    }

    #[test]
    fn test_collect_cleartexts_types_by_handle() {
        let c = Address::repeat_byte(1);
        let revoked = handle(1, FheType::Bool);
        let tag = handle(2, FheType::Uint32);
        let pairs = [HandleContractPair::new(revoked, c), HandleContractPair::new(tag, c)];
        let words = vec![
            (tag, ClearValue::Uint(U256::from(7u8)).to_word()),
            (revoked, ClearValue::Bool(false).to_word()),
        ];
        let out = collect_cleartexts(&pairs, words).unwrap();
        assert_eq!(out[&revoked], ClearValue::Bool(false));
        assert_eq!(out[&tag].as_u32(), Some(7));
    }

    #[test]
    fn test_collect_cleartexts_is_all_or_nothing() {
        let c = Address::repeat_byte(1);
        let a = handle(1, FheType::Bool);
        let b = handle(2, FheType::Uint32);
        let pairs = [HandleContractPair::new(a, c), HandleContractPair::new(b, c)];
        let word = ClearValue::Bool(true).to_word();

        let missing = collect_cleartexts(&pairs, vec![(a, word)]);
        let extra = collect_cleartexts(&pairs, vec![(a, word), (b, word), (handle(3, FheType::Bool), word)]);
        let twice = collect_cleartexts(&pairs, vec![(a, word), (a, word), (b, word)]);
        let bad_bool = collect_cleartexts(&pairs, vec![(a, B256::repeat_byte(9)), (b, word)]);
        for result in [missing, extra, twice, bad_bool] {
            assert!(matches!(result, Err(ConfidentialError::DecryptionFailure(_))));
        }
    }

    #[test]
    fn test_dedup_pairs() {
        let c = Address::repeat_byte(1);
        let p = HandleContractPair::new(handle(1, FheType::Bool), c);
        assert_eq!(dedup_pairs(&[p, p]), vec![p]);
    }
}
