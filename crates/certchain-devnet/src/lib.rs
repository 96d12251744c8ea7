//! Simulated network for CertChain tests and local demos.
//!
//! - [`DevNode`]: JSON-RPC developer node exposing the `fhevm_*` methods the
//!   simulated backend needs.
//! - [`MockRelayer`]: REST relayer that seals, attests and decrypts with
//!   throwaway keys.
//! - [`InMemoryRegistry`]: credential registry that verifies input proofs
//!   against the transaction sender.
//!
//! All three share one [`CleartextStore`].

pub mod node;
pub mod registry;
pub mod relayer;
pub mod store;

pub use node::{DevNode, NodeBehavior};
pub use registry::InMemoryRegistry;
pub use relayer::{MockRelayer, RelayerProfile};
pub use store::CleartextStore;

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral loopback port and return its base URL.
/// The server runs until the runtime shuts down.
pub async fn spawn(router: Router) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!(%addr, error = %e, "devnet server stopped");
        }
    });
    tracing::debug!(%addr, "devnet server listening");
    Ok(format!("http://{}", addr))
}

/// A loopback URL nothing listens on.
pub async fn unreachable_url() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}
