use alloy_primitives::Address;
use certchain_fhe::grant::MAX_VALIDITY_DAYS;
use certchain_fhe::{BackendConfig, GrantPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RootError, RootResult};

/// Validity requested for decryption grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantConfig {
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
}

fn default_validity_days() -> u32 {
    MAX_VALIDITY_DAYS
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
        }
    }
}

/// Metadata pinning service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinningConfig {
    #[serde(default = "default_pinning_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key or JWT. The credential
    /// itself never lives in the config file.
    #[serde(default = "default_pinning_key_env")]
    pub key_env: String,
}

fn default_pinning_endpoint() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_pinning_key_env() -> String {
    "PINATA_JWT".to_string()
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_pinning_endpoint(),
            key_env: default_pinning_key_env(),
        }
    }
}

impl PinningConfig {
    pub fn credential(&self) -> RootResult<String> {
        std::env::var(&self.key_env).map_err(|_| {
            RootError::Config(format!("pinning credential not set (export {})", self.key_env))
        })
    }
}

/// Top-level configuration for the CertChain binary.
///
/// Loaded from a TOML file (typically `~/.certchain/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootConfig {
    /// JSON-RPC endpoint of the chain hosting the registry.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Deployed credential registry.
    #[serde(default)]
    pub registry_address: Address,

    /// How long to wait for a transaction receipt.
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub grant: GrantConfig,

    #[serde(default)]
    pub pinning: PinningConfig,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_receipt_timeout() -> u64 {
    120
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            registry_address: Address::ZERO,
            receipt_timeout_secs: default_receipt_timeout(),
            backend: BackendConfig::default(),
            grant: GrantConfig::default(),
            pinning: PinningConfig::default(),
        }
    }
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RootResult<()> {
        reqwest::Url::parse(&self.rpc_url)
            .map_err(|e| RootError::Config(format!("rpc_url is not a valid URL: {}", e)))?;
        self.backend.validate().map_err(RootError::Config)?;
        self.grant_policy()?;
        reqwest::Url::parse(&self.pinning.endpoint).map_err(|e| {
            RootError::Config(format!("pinning.endpoint is not a valid URL: {}", e))
        })?;
        if self.pinning.key_env.is_empty() {
            return Err(RootError::Config("pinning.key_env must not be empty".into()));
        }
        if self.receipt_timeout_secs == 0 {
            return Err(RootError::Config("receipt_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// The registry address, refusing the unset zero address.
    pub fn registry(&self) -> RootResult<Address> {
        if self.registry_address == Address::ZERO {
            return Err(RootError::Config(
                "registry_address is not set (run `certchain init --registry <address>`)".into(),
            ));
        }
        Ok(self.registry_address)
    }

    pub fn grant_policy(&self) -> RootResult<GrantPolicy> {
        GrantPolicy::new(self.grant.validity_days)
            .map_err(|e| RootError::Config(format!("grant.validity_days: {}", e)))
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".certchain/config.toml")
    }
}
