use certchain_core::wire::RelayerEnvelope;
use certchain_core::{ConfidentialError, ConfidentialResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

// The relayer client is process-wide state: it is loaded at most once, even
// when several sessions race to resolve a remote backend, and is never torn
// down. The first caller's timeout wins.

static RELAYER_CLIENT: OnceCell<RelayerClient> = OnceCell::const_new();
static LOAD_COUNT: AtomicUsize = AtomicUsize::new(0);

/// HTTP client for the relayer's REST surface. Not bound to a deployment;
/// backends pass the base URL of the descriptor they were built against.
#[derive(Debug)]
pub struct RelayerClient {
    http: reqwest::Client,
}

impl RelayerClient {
    fn load(timeout: Duration) -> ConfidentialResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("certchain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfidentialError::BackendUnavailable(format!("relayer client load failed: {}", e))
            })?;
        Ok(Self { http })
    }

    pub async fn get<T: DeserializeOwned>(&self, base_url: &str, path: &str) -> ConfidentialResult<T> {
        let url = join(base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ConfidentialError::Transport(format!("GET {}: {}", url, e)))?;
        decode(&url, response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        body: &B,
    ) -> ConfidentialResult<T> {
        let url = join(base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ConfidentialError::Transport(format!("POST {}: {}", url, e)))?;
        decode(&url, response).await
    }
}

fn join(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> ConfidentialResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConfidentialError::Transport(format!(
            "{}: http status {}: {}",
            url, status, body
        )));
    }
    let envelope: RelayerEnvelope<T> = response
        .json()
        .await
        .map_err(|e| ConfidentialError::Transport(format!("{}: malformed response: {}", url, e)))?;
    Ok(envelope.response)
}

/// The process-wide relayer client, loading it on first use.
pub async fn relayer_client(timeout: Duration) -> ConfidentialResult<&'static RelayerClient> {
    RELAYER_CLIENT
        .get_or_try_init(|| async {
            LOAD_COUNT.fetch_add(1, Ordering::SeqCst);
            tracing::info!(timeout_secs = timeout.as_secs(), "loading relayer client");
            RelayerClient::load(timeout)
        })
        .await
}

/// How many times the relayer client has been loaded in this process.
pub fn load_count() -> usize {
    LOAD_COUNT.load(Ordering::SeqCst)
}
