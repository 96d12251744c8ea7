pub mod crypto;
pub mod eip712;
pub mod error;
pub mod handle;
pub mod proof;
pub mod seal;
pub mod signer;
pub mod traits;
pub mod types;
pub mod wire;

pub use crypto::*;
pub use error::*;
pub use handle::*;
pub use signer::LocalKeySigner;
pub use traits::*;
pub use types::*;

pub use alloy_primitives::{Address, Bytes, B256, U256};
