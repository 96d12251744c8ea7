use alloy_primitives::Address;
use std::fmt;
use thiserror::Error;

use crate::types::FheType;

/// Failure taxonomy of the confidential-field protocol.
///
/// Every variant is distinguishable so callers can present a distinct,
/// actionable message (reconnect wallet, retry later, re-authorize).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfidentialError {
    /// Neither the local nor the remote backend could be constructed.
    #[error("encryption backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Encrypted input or its proof could not be produced. Safe to retry by
    /// rebuilding the bundle from scratch.
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    /// The signer refused to sign the grant message.
    #[error("user declined the decryption authorization")]
    UserDeclinedAuthorization,

    #[error("decryption grant expired at {expired_at}")]
    GrantExpired { expired_at: u64 },

    #[error("decryption grant does not cover contract {0}")]
    GrantScopeMismatch(Address),

    /// The batch was rejected as a whole; no plaintext is returned.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("invalid decryption grant: {0}")]
    InvalidGrant(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ledger error: {0}")]
    Ledger(String),
}

pub type ConfidentialResult<T> = Result<T, ConfidentialError>;

/// Error variant tag for callers that only need the kind, not the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConfidentialErrorKind {
    BackendUnavailable,
    EncryptionFailure,
    UserDeclinedAuthorization,
    GrantExpired,
    GrantScopeMismatch,
    DecryptionFailure,
    InvalidGrant,
    Signing,
    Transport,
    Ledger,
}

impl ConfidentialErrorKind {
    /// Whether repeating the whole operation from scratch may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable | Self::EncryptionFailure | Self::Transport
        )
    }
}

impl fmt::Display for ConfidentialErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BackendUnavailable => "BackendUnavailable",
            Self::EncryptionFailure => "EncryptionFailure",
            Self::UserDeclinedAuthorization => "UserDeclinedAuthorization",
            Self::GrantExpired => "GrantExpired",
            Self::GrantScopeMismatch => "GrantScopeMismatch",
            Self::DecryptionFailure => "DecryptionFailure",
            Self::InvalidGrant => "InvalidGrant",
            Self::Signing => "Signing",
            Self::Transport => "Transport",
            Self::Ledger => "Ledger",
        };
        f.write_str(name)
    }
}

impl From<&ConfidentialError> for ConfidentialErrorKind {
    fn from(e: &ConfidentialError) -> Self {
        match e {
            ConfidentialError::BackendUnavailable(_) => Self::BackendUnavailable,
            ConfidentialError::EncryptionFailure(_) => Self::EncryptionFailure,
            ConfidentialError::UserDeclinedAuthorization => Self::UserDeclinedAuthorization,
            ConfidentialError::GrantExpired { .. } => Self::GrantExpired,
            ConfidentialError::GrantScopeMismatch(_) => Self::GrantScopeMismatch,
            ConfidentialError::DecryptionFailure(_) => Self::DecryptionFailure,
            ConfidentialError::InvalidGrant(_) => Self::InvalidGrant,
            ConfidentialError::Signing(_) => Self::Signing,
            ConfidentialError::Transport(_) | ConfidentialError::Rpc { .. } => Self::Transport,
            ConfidentialError::Ledger(_) => Self::Ledger,
        }
    }
}

impl ConfidentialError {
    pub fn kind(&self) -> ConfidentialErrorKind {
        self.into()
    }
}

/// A plaintext value that does not match its declared FHE type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value does not fit in {0}")]
    Overflow(FheType),

    #[error("{value} value cannot be encoded as {expected}")]
    TypeMismatch { expected: FheType, value: &'static str },

    #[error("boolean word must be 0 or 1")]
    InvalidBool,
}
