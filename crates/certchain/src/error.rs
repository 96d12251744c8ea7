use certchain_core::{ConfidentialError, ConfidentialErrorKind};
use thiserror::Error;

use crate::pinning::PinningError;

/// Error type for the CertChain library and binary, aggregating the
/// workspace crates' errors.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("{0}")]
    Confidential(#[from] ConfidentialError),

    #[error("pinning error: {0}")]
    Pinning(#[from] PinningError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("credential {0} not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RootError {
    /// The protocol failure kind, when this error came from the protocol.
    pub fn confidential_kind(&self) -> Option<ConfidentialErrorKind> {
        match self {
            RootError::Confidential(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_error_config() {
        let err = RootError::Config("registry_address is not set".into());
        assert_eq!(err.to_string(), "configuration error: registry_address is not set");
    }

    #[test]
    fn test_root_error_from_confidential_keeps_kind() {
        let err: RootError = ConfidentialError::UserDeclinedAuthorization.into();
        assert_eq!(err.confidential_kind(), Some(ConfidentialErrorKind::UserDeclinedAuthorization));
        assert_eq!(RootError::Config("x".into()).confidential_kind(), None);
    }

    #[test]
    fn test_root_error_from_pinning() {
        let err: RootError = PinningError::MissingCid.into();
        assert!(err.to_string().contains("CID"));
    }

    #[test]
    fn test_root_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let root_err: RootError = json_err.into();
        assert!(matches!(root_err, RootError::Serialization(_)));
    }

    #[test]
    fn test_root_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let root_err: RootError = toml_err.into();
        assert!(matches!(root_err, RootError::Config(_)));
    }
}
