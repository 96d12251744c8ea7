use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;
use crate::handle::CiphertextHandle;

// ---------------------------------------------------------------------------
// Timestamp: canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub const SECONDS_PER_DAY: u64 = 86_400;

    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds_since_epoch: now.timestamp() as u64,
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    pub fn plus_days(&self, days: u32) -> Self {
        Self {
            seconds_since_epoch: self
                .seconds_since_epoch
                .saturating_add(u64::from(days) * Self::SECONDS_PER_DAY),
            nanoseconds: self.nanoseconds,
        }
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }

    pub fn is_expired(&self) -> bool {
        *self < Self::now()
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp() as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkContext: the chain a backend was resolved against
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Simulated encryption against a developer node.
    Local,
    /// Relayer-backed encryption against a public network.
    Remote,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Local => write!(f, "local"),
            EndpointKind::Remote => write!(f, "remote"),
        }
    }
}

/// Immutable once a backend has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContext {
    pub chain_id: u64,
    pub endpoint_kind: EndpointKind,
    pub rpc_target: String,
}

// ---------------------------------------------------------------------------
// FheType: encrypted value types understood by the ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Uint128 = 6,
    Address = 7,
    Uint256 = 8,
}

impl FheType {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Bool),
            2 => Some(Self::Uint8),
            3 => Some(Self::Uint16),
            4 => Some(Self::Uint32),
            5 => Some(Self::Uint64),
            6 => Some(Self::Uint128),
            7 => Some(Self::Address),
            8 => Some(Self::Uint256),
            _ => None,
        }
    }

    /// Width of the plaintext domain in bits.
    pub fn bit_width(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Uint8 => 8,
            Self::Uint16 => 16,
            Self::Uint32 => 32,
            Self::Uint64 => 64,
            Self::Uint128 => 128,
            Self::Address => 160,
            Self::Uint256 => 256,
        }
    }

    /// Bits consumed when packed into an input. Booleans take two.
    pub fn packed_bits(self) -> usize {
        match self {
            Self::Bool => 2,
            other => other.bit_width(),
        }
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "ebool"),
            Self::Address => write!(f, "eaddress"),
            other => write!(f, "euint{}", other.bit_width()),
        }
    }
}

// ---------------------------------------------------------------------------
// ClearValue: a decrypted (or to-be-encrypted) plaintext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Address(Address),
}

impl ClearValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) if v.bit_len() <= 64 => Some(v.as_limbs()[0]),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Uint(_) => "uint",
            Self::Address(_) => "address",
        }
    }

    /// Whether the value can be carried by a field of type `ty`.
    pub fn check(&self, ty: FheType) -> Result<(), ValueError> {
        match (self, ty) {
            (Self::Bool(_), FheType::Bool) => Ok(()),
            (Self::Address(_), FheType::Address) => Ok(()),
            (Self::Uint(v), t) if t != FheType::Bool && t != FheType::Address => {
                if v.bit_len() <= t.bit_width() {
                    Ok(())
                } else {
                    Err(ValueError::Overflow(t))
                }
            }
            (v, t) => Err(ValueError::TypeMismatch {
                expected: t,
                value: v.kind_name(),
            }),
        }
    }

    /// 32-byte big-endian word.
    pub fn to_word(&self) -> B256 {
        match self {
            Self::Bool(b) => B256::from(U256::from(u8::from(*b)).to_be_bytes::<32>()),
            Self::Uint(v) => B256::from(v.to_be_bytes::<32>()),
            Self::Address(a) => a.into_word(),
        }
    }

    /// Decode a word according to the declared type, rejecting values that
    /// fall outside the type's domain.
    pub fn from_word(ty: FheType, word: &B256) -> Result<Self, ValueError> {
        let v = U256::from_be_bytes(word.0);
        match ty {
            FheType::Bool => {
                if v == U256::ZERO {
                    Ok(Self::Bool(false))
                } else if v == U256::from(1u8) {
                    Ok(Self::Bool(true))
                } else {
                    Err(ValueError::InvalidBool)
                }
            }
            FheType::Address => {
                if v.bit_len() > 160 {
                    return Err(ValueError::Overflow(ty));
                }
                Ok(Self::Address(Address::from_word(*word)))
            }
            t => {
                if v.bit_len() > t.bit_width() {
                    return Err(ValueError::Overflow(t));
                }
                Ok(Self::Uint(v))
            }
        }
    }
}

impl fmt::Display for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Address(a) => write!(f, "{a}"),
        }
    }
}

// ---------------------------------------------------------------------------
// InputField: one typed plaintext queued for encryption
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub fhe_type: FheType,
    pub value: ClearValue,
}

impl InputField {
    pub fn bool(v: bool) -> Self {
        Self {
            fhe_type: FheType::Bool,
            value: ClearValue::Bool(v),
        }
    }

    pub fn uint(fhe_type: FheType, v: impl Into<U256>) -> Self {
        Self {
            fhe_type,
            value: ClearValue::Uint(v.into()),
        }
    }

    pub fn uint32(v: u32) -> Self {
        Self::uint(FheType::Uint32, U256::from(v))
    }

    pub fn uint64(v: u64) -> Self {
        Self::uint(FheType::Uint64, U256::from(v))
    }

    pub fn address(a: Address) -> Self {
        Self {
            fhe_type: FheType::Address,
            value: ClearValue::Address(a),
        }
    }

    pub fn validate(&self) -> Result<(), ValueError> {
        self.value.check(self.fhe_type)
    }
}

// ---------------------------------------------------------------------------
// HandleContractPair: a handle is only meaningful next to its contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract: Address,
}

impl HandleContractPair {
    pub fn new(handle: CiphertextHandle, contract: Address) -> Self {
        Self { handle, contract }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(pub B256);

impl CredentialId {
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(B256::from(bytes))
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CredentialId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| format!("invalid credential id: {e}"))?;
        if bytes.len() != 32 {
            return Err(format!(
                "invalid credential id: expected 32 bytes, got {}",
                bytes.len()
            ));
        }
        Ok(Self(B256::from_slice(&bytes)))
    }
}

/// A credential as the ledger returns it. The revocation flag and course tag
/// are ciphertext handles, not plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub issuer: Address,
    pub owner: Address,
    pub metadata_uri: String,
    pub issued_at: u64,
    pub valid_until: u64,
    pub revoked_handle: CiphertextHandle,
    pub course_tag_handle: CiphertextHandle,
}

impl CredentialRecord {
    /// The confidential fields paired with the contract that stores them.
    pub fn confidential_pairs(&self, contract: Address) -> [HandleContractPair; 2] {
        [
            HandleContractPair::new(self.revoked_handle, contract),
            HandleContractPair::new(self.course_tag_handle, contract),
        ]
    }

    /// Zero means the credential never lapses.
    pub fn is_lapsed_at(&self, now: u64) -> bool {
        self.valid_until != 0 && self.valid_until < now
    }
}

/// Arguments of an issuance transaction. The encrypted tag and proof come
/// from a single `EncryptedInputBundle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSubmission {
    pub recipient: Address,
    pub metadata_uri: String,
    pub valid_until: u64,
    pub encrypted_tag: CiphertextHandle,
    pub proof: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub tx_hash: B256,
    pub id: CredentialId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_seconds(1000);
        let t2 = Timestamp::from_seconds(2000);
        assert!(t1 < t2);
    }

    #[test]
    fn test_timestamp_plus_days() {
        let t = Timestamp::from_seconds(100).plus_days(2);
        assert_eq!(t.seconds_since_epoch, 100 + 2 * 86_400);
        assert!(Timestamp::from_seconds(0).plus_days(1).is_expired());
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Timestamp::from_seconds(0);
        assert!(ts.to_rfc3339().starts_with("1970-01-01"));
    }

    #[test]
    fn test_fhe_type_ids() {
        for ty in [
            FheType::Bool,
            FheType::Uint8,
            FheType::Uint16,
            FheType::Uint32,
            FheType::Uint64,
            FheType::Uint128,
            FheType::Address,
            FheType::Uint256,
        ] {
            assert_eq!(FheType::from_id(ty.id()), Some(ty));
        }
        assert_eq!(FheType::from_id(1), None);
        assert_eq!(FheType::from_id(9), None);
        assert_eq!(FheType::Bool.packed_bits(), 2);
        assert_eq!(FheType::Uint32.to_string(), "euint32");
        assert_eq!(FheType::Bool.to_string(), "ebool");
    }

    #[test]
    fn test_clear_value_check() {
        assert!(InputField::uint32(7).validate().is_ok());
        assert_eq!(
            InputField::uint(FheType::Uint8, U256::from(256u32)).validate(),
            Err(ValueError::Overflow(FheType::Uint8))
        );
        let mismatched = InputField {
            fhe_type: FheType::Uint32,
            value: ClearValue::Bool(true),
        };
        assert!(matches!(
            mismatched.validate(),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_clear_value_words() {
        let word = ClearValue::Uint(U256::from(7u8)).to_word();
        assert_eq!(word.0[31], 7);
        assert_eq!(
            ClearValue::from_word(FheType::Uint32, &word).unwrap().as_u32(),
            Some(7)
        );
        assert_eq!(
            ClearValue::from_word(FheType::Bool, &ClearValue::Bool(true).to_word()).unwrap(),
            ClearValue::Bool(true)
        );
        assert_eq!(
            ClearValue::from_word(FheType::Bool, &word),
            Err(ValueError::InvalidBool)
        );
        assert_eq!(
            ClearValue::from_word(FheType::Uint8, &B256::repeat_byte(0xff)),
            Err(ValueError::Overflow(FheType::Uint8))
        );
    }

    #[test]
    fn test_address_word() {
        let a = Address::repeat_byte(0x11);
        let word = ClearValue::Address(a).to_word();
        assert_eq!(&word.0[..12], &[0u8; 12]);
        assert_eq!(
            ClearValue::from_word(FheType::Address, &word).unwrap(),
            ClearValue::Address(a)
        );
    }

    #[test]
    fn test_credential_id_parse() {
        let id = CredentialId::random();
        let parsed: CredentialId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("0x1234".parse::<CredentialId>().is_err());
        assert!("zz".parse::<CredentialId>().is_err());
    }

    #[test]
    fn test_record_lapse() {
        let record = CredentialRecord {
            id: CredentialId(B256::ZERO),
            issuer: Address::ZERO,
            owner: Address::ZERO,
            metadata_uri: "ipfs://x".into(),
            issued_at: 10,
            valid_until: 0,
            revoked_handle: CiphertextHandle(B256::ZERO),
            course_tag_handle: CiphertextHandle(B256::ZERO),
        };
        assert!(!record.is_lapsed_at(u64::MAX));
        let bounded = CredentialRecord {
            valid_until: 100,
            ..record
        };
        assert!(bounded.is_lapsed_at(101));
        assert!(!bounded.is_lapsed_at(100));
    }
}
