//! CertChain
//!
//! Verifiable credentials whose revocation flag and course tag stay
//! encrypted on the ledger. This crate is the orchestration layer: it reads
//! configuration, pins metadata, talks to the registry contract, and drives
//! the confidential-field session from `certchain-fhe`.
//!
//! # Architecture
//!
//! [`CertChainClient`] pairs a [`certchain_fhe::ConfidentialSession`] with a
//! [`certchain_core::CredentialLedger`]. In production the ledger is the
//! [`RegistryClient`] speaking JSON-RPC to the deployed contract; tests swap
//! in an in-memory registry without touching the client.

pub mod client;
pub mod config;
pub mod error;
pub mod pinning;
pub mod registry;

pub use client::{resolve_identity, CertChainClient, CredentialStatus, IssueRequest, PRIVATE_KEY_ENV};
pub use config::{GrantConfig, PinningConfig, RootConfig};
pub use error::{RootError, RootResult};
pub use pinning::{CredentialMetadata, PinningClient, PinningError};
pub use registry::{ICertChainRegistry, RegistryClient};
