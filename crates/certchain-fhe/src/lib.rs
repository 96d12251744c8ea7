//! CertChain confidential fields
//!
//! Client side of the protocol that keeps credential fields encrypted on the
//! ledger:
//!
//! - [`selector`] picks the simulated or relayer-backed [`backend`] for a
//!   network candidate, once per session.
//! - [`input`] turns typed plaintext fields into ciphertext handles plus a
//!   proof bound to a contract and submitter.
//! - [`grant`] obtains a short-lived signed authorization and exchanges it
//!   for plaintext.
//! - [`session`] ties the three together for one user and caches grants.

pub mod backend;
pub mod config;
pub mod grant;
pub mod input;
pub mod loader;
pub mod rpc;
pub mod selector;
pub mod session;

pub use backend::{EncryptionBackend, LocalBackend, RemoteBackend};
pub use config::{BackendConfig, LocalNodeConfig, RelayerConfig};
pub use grant::{authorize, authorize_with_policy, decrypt, DecryptionGrant, GrantPolicy, UnsignedGrant};
pub use input::{EncryptedInputBuilder, EncryptedInputBundle};
pub use rpc::{HttpTransport, WalletSigner};
pub use selector::{BackendSelector, CandidateEndpoint};
pub use session::ConfidentialSession;
