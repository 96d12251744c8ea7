//! IPFS pinning of credential metadata.
//!
//! The returned `ipfs://<cid>` URI is stored on the ledger as is and never
//! interpreted afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinningError {
    #[error("pinning request failed: {0}")]
    Http(String),

    #[error("pinning service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("pinning response missing CID")]
    MissingCid,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PinningResult<T> = Result<T, PinningError>;

/// Off-chain description of a credential, pinned before issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    pub title: String,
    pub recipient_name: String,
    pub issuer_name: String,
    pub course: String,
    pub grade: String,
    /// `YYYY-MM-DD`
    pub issued_date: String,
}

impl CredentialMetadata {
    /// Metadata dated today (UTC).
    pub fn dated_today(
        title: impl Into<String>,
        recipient_name: impl Into<String>,
        issuer_name: impl Into<String>,
        course: impl Into<String>,
        grade: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            recipient_name: recipient_name.into(),
            issuer_name: issuer_name.into(),
            course: course.into(),
            grade: grade.into(),
            issued_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinningClient {
    http: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl PinningClient {
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>, timeout: Duration) -> PinningResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PinningError::Http(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            credential: credential.into(),
        })
    }

    /// JWTs go out as bearer tokens, API keys verbatim.
    fn authorization(&self) -> String {
        if self.credential.starts_with("eyJ") {
            format!("Bearer {}", self.credential)
        } else {
            self.credential.clone()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }

    pub async fn pin_json<T: Serialize + ?Sized>(&self, content: &T) -> PinningResult<String> {
        let body = serde_json::json!({ "pinataContent": content });
        let response = self
            .http
            .post(self.url("pinning/pinJSONToIPFS"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| PinningError::Http(e.to_string()))?;
        let uri = ipfs_uri(response).await?;
        tracing::info!(%uri, "metadata pinned");
        Ok(uri)
    }

    pub async fn pin_file(&self, path: &Path) -> PinningResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(name));
        let response = self
            .http
            .post(self.url("pinning/pinFileToIPFS"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PinningError::Http(e.to_string()))?;
        let uri = ipfs_uri(response).await?;
        tracing::info!(%uri, file = %path.display(), "file pinned");
        Ok(uri)
    }
}

async fn ipfs_uri(response: reqwest::Response) -> PinningResult<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PinningError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| PinningError::Http(format!("malformed response: {}", e)))?;
    cid_from(&body)
        .map(|cid| format!("ipfs://{}", cid))
        .ok_or(PinningError::MissingCid)
}

fn cid_from(body: &Value) -> Option<&str> {
    ["IpfsHash", "Hash", "cid"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str).filter(|cid| !cid.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(credential: &str) -> PinningClient {
        PinningClient::new("https://pin.example/", credential, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_authorization_scheme() {
        assert_eq!(client("eyJhbGciOi.x.y").authorization(), "Bearer eyJhbGciOi.x.y");
        assert_eq!(client("raw-api-key").authorization(), "raw-api-key");
    }

    #[test]
    fn test_url_join() {
        assert_eq!(
            client("k").url("pinning/pinJSONToIPFS"),
            "https://pin.example/pinning/pinJSONToIPFS"
        );
    }

    #[test]
    fn test_cid_field_precedence() {
        assert_eq!(cid_from(&json!({ "IpfsHash": "Qm1", "cid": "bafy" })), Some("Qm1"));
        assert_eq!(cid_from(&json!({ "Hash": "Qm2" })), Some("Qm2"));
        assert_eq!(cid_from(&json!({ "cid": "bafy3" })), Some("bafy3"));
        assert_eq!(cid_from(&json!({ "IpfsHash": "", "Hash": "Qm4" })), Some("Qm4"));
        assert_eq!(cid_from(&json!({ "IpfsHash": "" })), None);
        assert_eq!(cid_from(&json!({ "other": 1 })), None);
    }

    #[test]
    fn test_metadata_field_names() {
        let meta = CredentialMetadata::dated_today("Certificate", "Ada", "Academy", "Rust", "A");
        let v = serde_json::to_value(&meta).unwrap();
        for key in ["title", "recipientName", "issuerName", "course", "grade", "issuedDate"] {
            assert!(v.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(meta.issued_date.len(), 10);
    }
}
