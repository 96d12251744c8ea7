//! JSON-RPC client for the deployed credential registry.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use async_trait::async_trait;
use certchain_core::{
    parse_quantity, CiphertextHandle, ConfidentialError, ConfidentialResult, CredentialId,
    CredentialLedger, CredentialRecord, CredentialSubmission, IssuedCredential, NetworkTransport,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

sol! {
    interface ICertChainRegistry {
        event CertificateIssued(
            bytes32 indexed certId,
            address indexed issuer,
            address indexed recipient,
            string cid,
            uint64 validUntil
        );

        function registerIssuer(string name, string metadataURI) external;
        function isIssuer(address account) external view returns (bool);

        function issueCertificate(
            address recipient,
            string cid,
            bytes32 certId,
            uint64 validUntil,
            bytes32 courseTag,
            bytes inputProof
        ) external;

        function issueCertificateAuto(
            address recipient,
            string cid,
            uint64 validUntil,
            bytes32 courseTag,
            bytes inputProof
        ) external returns (bytes32 certId);

        function getCertificate(bytes32 certId) external view returns (
            bytes32 id,
            address issuer,
            address owner,
            string cid,
            uint64 issuedAt,
            uint64 validUntil,
            bytes32 revokedHandle,
            bytes32 courseTagHandle
        );

        function revokeCertificate(bytes32 certId, string reason) external;
        function restoreCertificate(bytes32 certId) external;
    }
}

use ICertChainRegistry::CertificateIssued;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The registry contract, reached through a node.
///
/// Reads use `eth_call`. Writes are sent with `eth_sendTransaction` from
/// the configured account, so the node or wallet behind the transport must
/// control it, and are confirmed by polling for the receipt.
pub struct RegistryClient {
    transport: Arc<dyn NetworkTransport>,
    contract: Address,
    from: Address,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RegistryClient {
    pub fn new(
        transport: Arc<dyn NetworkTransport>,
        contract: Address,
        from: Address,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            contract,
            from,
            receipt_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn from_address(&self) -> Address {
        self.from
    }

    async fn call<C: SolCall>(&self, call: C) -> ConfidentialResult<C::Return> {
        let data = Bytes::from(call.abi_encode());
        let result = self
            .transport
            .request(
                "eth_call",
                json!([{ "from": self.from, "to": self.contract, "data": data }, "latest"]),
            )
            .await
            .map_err(revert_as_ledger)?;
        let raw: Bytes = serde_json::from_value(result)
            .map_err(|e| ConfidentialError::Transport(format!("eth_call result: {}", e)))?;
        C::abi_decode_returns(&raw, true).map_err(|e| {
            ConfidentialError::Ledger(format!("cannot decode {} result: {}", C::SIGNATURE, e))
        })
    }

    /// Send a transaction and wait for a successful receipt.
    async fn transact<C: SolCall>(&self, call: C) -> ConfidentialResult<(B256, Value)> {
        let data = Bytes::from(call.abi_encode());
        let result = self
            .transport
            .request(
                "eth_sendTransaction",
                json!([{ "from": self.from, "to": self.contract, "data": data }]),
            )
            .await
            .map_err(revert_as_ledger)?;
        let tx_hash: B256 = serde_json::from_value(result)
            .map_err(|e| ConfidentialError::Transport(format!("transaction hash: {}", e)))?;
        tracing::debug!(tx = %tx_hash, call = C::SIGNATURE, "transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        let status = receipt
            .get("status")
            .map(parse_quantity)
            .transpose()?
            .unwrap_or(1);
        if status != 1 {
            return Err(ConfidentialError::Ledger(format!(
                "transaction {} reverted ({})",
                tx_hash,
                C::SIGNATURE
            )));
        }
        Ok((tx_hash, receipt))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> ConfidentialResult<Value> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .transport
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(ConfidentialError::Ledger(format!(
                    "no receipt for {} after {}s",
                    tx_hash,
                    self.receipt_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Credential id of the `CertificateIssued` log this contract emitted.
    fn issued_id(&self, logs: &Value) -> Option<CredentialId> {
        logs.as_array()?
            .iter()
            .filter(|log| {
                log.get("address")
                    .and_then(|a| serde_json::from_value::<Address>(a.clone()).ok())
                    == Some(self.contract)
            })
            .find_map(issued_id_from_log)
    }

    async fn issue(&self, call: impl SolCall, expected: Option<CredentialId>) -> ConfidentialResult<IssuedCredential> {
        let (tx_hash, receipt) = self.transact(call).await?;
        let id = match (self.issued_id(&receipt["logs"]), expected) {
            (Some(id), _) => id,
            (None, Some(id)) => id,
            (None, None) => {
                return Err(ConfidentialError::Ledger(format!(
                    "transaction {} emitted no CertificateIssued event",
                    tx_hash
                )))
            }
        };
        tracing::info!(credential = %id, tx = %tx_hash, "credential issued");
        Ok(IssuedCredential { tx_hash, id })
    }
}

/// `topics = [signature, certId, issuer, recipient]`
fn issued_id_from_log(log: &Value) -> Option<CredentialId> {
    let topics: Vec<B256> = serde_json::from_value(log.get("topics")?.clone()).ok()?;
    match topics.as_slice() {
        [sig, id, ..] if *sig == CertificateIssued::SIGNATURE_HASH => Some(CredentialId(*id)),
        _ => None,
    }
}

/// Node errors on calls and sends are contract reverts; keep their message.
fn revert_as_ledger(e: ConfidentialError) -> ConfidentialError {
    match e {
        ConfidentialError::Rpc { message, .. } => ConfidentialError::Ledger(message),
        other => other,
    }
}

#[async_trait]
impl CredentialLedger for RegistryClient {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn submit_credential(
        &self,
        id: CredentialId,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential> {
        let call = ICertChainRegistry::issueCertificateCall {
            recipient: submission.recipient,
            cid: submission.metadata_uri,
            certId: id.0,
            validUntil: submission.valid_until,
            courseTag: submission.encrypted_tag.0,
            inputProof: submission.proof,
        };
        self.issue(call, Some(id)).await
    }

    async fn submit_credential_auto(
        &self,
        submission: CredentialSubmission,
    ) -> ConfidentialResult<IssuedCredential> {
        let call = ICertChainRegistry::issueCertificateAutoCall {
            recipient: submission.recipient,
            cid: submission.metadata_uri,
            validUntil: submission.valid_until,
            courseTag: submission.encrypted_tag.0,
            inputProof: submission.proof,
        };
        self.issue(call, None).await
    }

    async fn get_credential(&self, id: CredentialId) -> ConfidentialResult<Option<CredentialRecord>> {
        let r = self
            .call(ICertChainRegistry::getCertificateCall { certId: id.0 })
            .await?;
        // Unknown ids read back as the zero struct.
        if r.issuer == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(CredentialRecord {
            id: CredentialId(r.id),
            issuer: r.issuer,
            owner: r.owner,
            metadata_uri: r.cid,
            issued_at: r.issuedAt,
            valid_until: r.validUntil,
            revoked_handle: CiphertextHandle(r.revokedHandle),
            course_tag_handle: CiphertextHandle(r.courseTagHandle),
        }))
    }

    async fn set_revoked(&self, id: CredentialId, reason: &str) -> ConfidentialResult<B256> {
        let call = ICertChainRegistry::revokeCertificateCall {
            certId: id.0,
            reason: reason.to_string(),
        };
        let (tx_hash, _) = self.transact(call).await?;
        tracing::info!(credential = %id, tx = %tx_hash, "credential revoked");
        Ok(tx_hash)
    }

    async fn clear_revoked(&self, id: CredentialId) -> ConfidentialResult<B256> {
        let (tx_hash, _) = self
            .transact(ICertChainRegistry::restoreCertificateCall { certId: id.0 })
            .await?;
        tracing::info!(credential = %id, tx = %tx_hash, "credential restored");
        Ok(tx_hash)
    }

    async fn is_issuer(&self, account: Address) -> ConfidentialResult<bool> {
        let r = self.call(ICertChainRegistry::isIssuerCall { account }).await?;
        Ok(r._0)
    }

    async fn register_issuer(&self, name: &str, metadata_uri: &str) -> ConfidentialResult<B256> {
        let call = ICertChainRegistry::registerIssuerCall {
            name: name.to_string(),
            metadataURI: metadata_uri.to_string(),
        };
        let (tx_hash, _) = self.transact(call).await?;
        tracing::info!(issuer = %self.from, tx = %tx_hash, "issuer registered");
        Ok(tx_hash)
    }

    async fn issued_to(&self, recipient: Address) -> ConfidentialResult<Vec<CredentialId>> {
        let filter = json!({
            "address": self.contract,
            "fromBlock": "0x0",
            "toBlock": "latest",
            "topics": [CertificateIssued::SIGNATURE_HASH, Value::Null, Value::Null, recipient.into_word()],
        });
        let logs = self.transport.request("eth_getLogs", json!([filter])).await?;
        let logs = logs
            .as_array()
            .ok_or_else(|| ConfidentialError::Transport("eth_getLogs result is not an array".into()))?;
        Ok(logs.iter().filter_map(issued_id_from_log).collect())
    }
}
