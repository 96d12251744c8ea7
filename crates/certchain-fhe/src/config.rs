use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Developer node that may host the simulated backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNodeConfig {
    /// JSON-RPC URL probed for the simulated backend.
    #[serde(default = "default_local_url")]
    pub url: String,

    /// Chain id that marks a candidate as a possible developer chain.
    #[serde(default = "default_local_chain_id")]
    pub chain_id: u64,

    /// Substring expected in `web3_clientVersion`.
    #[serde(default = "default_client_marker")]
    pub client_marker: String,

    #[serde(default = "default_gateway_chain_id")]
    pub gateway_chain_id: u64,

    #[serde(default = "default_local_decryption_contract")]
    pub verifying_contract_decryption: Address,

    #[serde(default = "default_local_input_contract")]
    pub verifying_contract_input_verification: Address,

    /// Hex private key the simulated coprocessor attests inputs with.
    /// Development-only material.
    #[serde(default = "default_coprocessor_key")]
    pub coprocessor_key: String,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_local_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_local_chain_id() -> u64 {
    31337
}

fn default_client_marker() -> String {
    "hardhat".to_string()
}

fn default_gateway_chain_id() -> u64 {
    55815
}

fn default_local_decryption_contract() -> Address {
    address!("5ffdaab0373e62e2ea2944776209aef29e631a64")
}

fn default_local_input_contract() -> Address {
    address!("812b06e1cdce800494b79ffe4f925a504a9a9810")
}

fn default_coprocessor_key() -> String {
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

impl Default for LocalNodeConfig {
    fn default() -> Self {
        Self {
            url: default_local_url(),
            chain_id: default_local_chain_id(),
            client_marker: default_client_marker(),
            gateway_chain_id: default_gateway_chain_id(),
            verifying_contract_decryption: default_local_decryption_contract(),
            verifying_contract_input_verification: default_local_input_contract(),
            coprocessor_key: default_coprocessor_key(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl LocalNodeConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Production relayer descriptor. Defaults target the Sepolia deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_relayer_url")]
    pub url: String,

    #[serde(default = "default_relayer_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_gateway_chain_id")]
    pub gateway_chain_id: u64,

    #[serde(default = "default_acl")]
    pub acl_contract: Address,

    #[serde(default = "default_kms")]
    pub kms_contract: Address,

    #[serde(default = "default_input_verifier")]
    pub input_verifier_contract: Address,

    #[serde(default = "default_relayer_decryption_contract")]
    pub verifying_contract_decryption: Address,

    #[serde(default = "default_relayer_input_contract")]
    pub verifying_contract_input_verification: Address,
}

fn default_relayer_url() -> String {
    "https://relayer.testnet.zama.cloud".to_string()
}

fn default_relayer_chain_id() -> u64 {
    11_155_111
}

fn default_acl() -> Address {
    address!("687820221192c5b662b25367f70076a37bc79b6c")
}

fn default_kms() -> Address {
    address!("1364cbbf2cdf5032c47d8226a6f6fbd2afcdacac")
}

fn default_input_verifier() -> Address {
    address!("bc91f3dad1a5f19f8390c400196e58073b6a0bc4")
}

fn default_relayer_decryption_contract() -> Address {
    address!("b6e160b1ff80d67bfe90a85ee06ce0a2613607d1")
}

fn default_relayer_input_contract() -> Address {
    address!("7048c39f048125eda9d678aebadfb22f7900a29f")
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            url: default_relayer_url(),
            chain_id: default_relayer_chain_id(),
            gateway_chain_id: default_gateway_chain_id(),
            acl_contract: default_acl(),
            kms_contract: default_kms(),
            input_verifier_contract: default_input_verifier(),
            verifying_contract_decryption: default_relayer_decryption_contract(),
            verifying_contract_input_verification: default_relayer_input_contract(),
        }
    }
}

/// Everything the selector needs to build either backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Upper bound on every relayer and node request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub local: LocalNodeConfig,

    #[serde(default)]
    pub relayer: RelayerConfig,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            local: LocalNodeConfig::default(),
            relayer: RelayerConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".into());
        }
        if self.local.probe_timeout_ms == 0 {
            return Err("local.probe_timeout_ms must be > 0".into());
        }
        if self.local.client_marker.is_empty() {
            return Err("local.client_marker must not be empty".into());
        }
        reqwest::Url::parse(&self.relayer.url)
            .map_err(|e| format!("relayer.url is not a valid URL: {}", e))?;
        reqwest::Url::parse(&self.local.url)
            .map_err(|e| format!("local.url is not a valid URL: {}", e))?;
        Ok(())
    }
}
