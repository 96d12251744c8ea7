use alloy_primitives::Address;
use certchain_core::{
    CiphertextHandle, ClearValue, ConfidentialError, ConfidentialResult, HandleContractPair,
    IdentitySigner, Timestamp,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::EncryptionBackend;
use crate::grant::{self, DecryptionGrant, GrantPolicy};
use crate::input::EncryptedInputBuilder;

/// Grants are cached per identity and exact contract set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GrantKey {
    user: Address,
    contracts: BTreeSet<Address>,
}

/// One user's view of the confidential-field protocol.
///
/// Holds the backend resolved for this session and the signer acting for
/// the user. Signed grants are reused until they expire; dropping the
/// session drops every grant and with it the ephemeral secrets.
pub struct ConfidentialSession {
    backend: Arc<EncryptionBackend>,
    signer: Arc<dyn IdentitySigner>,
    policy: GrantPolicy,
    grants: Mutex<HashMap<GrantKey, Arc<DecryptionGrant>>>,
}

impl ConfidentialSession {
    pub fn new(backend: Arc<EncryptionBackend>, signer: Arc<dyn IdentitySigner>) -> Self {
        Self::with_policy(backend, signer, GrantPolicy::default())
    }

    pub fn with_policy(
        backend: Arc<EncryptionBackend>,
        signer: Arc<dyn IdentitySigner>,
        policy: GrantPolicy,
    ) -> Self {
        Self {
            backend,
            signer,
            policy,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<EncryptionBackend> {
        &self.backend
    }

    pub fn user(&self) -> Address {
        self.signer.address()
    }

    /// Start an encrypted input for `contract`, submitted by this session's user.
    pub fn encrypt_input(&self, contract: Address) -> EncryptedInputBuilder {
        EncryptedInputBuilder::new(self.backend.clone(), contract, self.user())
    }

    /// A valid grant for exactly `contracts`, signing a new one if none is cached.
    pub async fn grant_for(&self, contracts: &[Address]) -> ConfidentialResult<Arc<DecryptionGrant>> {
        let key = GrantKey {
            user: self.user(),
            contracts: contracts.iter().copied().collect(),
        };
        let now = Timestamp::now().seconds_since_epoch;
        {
            let mut grants = self.lock_grants()?;
            match grants.get(&key) {
                Some(g) if !g.is_expired_at(now) => return Ok(g.clone()),
                Some(_) => {
                    grants.remove(&key);
                }
                None => {}
            }
        }

        let contracts: Vec<Address> = key.contracts.iter().copied().collect();
        let fresh = Arc::new(
            grant::authorize_with_policy(&self.backend, self.signer.as_ref(), &contracts, self.policy)
                .await?,
        );
        self.lock_grants()?.insert(key, fresh.clone());
        Ok(fresh)
    }

    /// Decrypt a batch, obtaining a grant covering every contract involved.
    pub async fn decrypt(
        &self,
        pairs: &[HandleContractPair],
    ) -> ConfidentialResult<HashMap<CiphertextHandle, ClearValue>> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }
        let contracts: BTreeSet<Address> = pairs.iter().map(|p| p.contract).collect();
        let contracts: Vec<Address> = contracts.into_iter().collect();
        let grant = self.grant_for(&contracts).await?;
        grant::decrypt(&self.backend, &grant, pairs).await
    }

    /// Forget every cached grant.
    pub fn clear_grants(&self) -> ConfidentialResult<()> {
        self.lock_grants()?.clear();
        Ok(())
    }

    pub fn cached_grants(&self) -> ConfidentialResult<usize> {
        Ok(self.lock_grants()?.len())
    }

    fn lock_grants(
        &self,
    ) -> ConfidentialResult<std::sync::MutexGuard<'_, HashMap<GrantKey, Arc<DecryptionGrant>>>> {
        self.grants
            .lock()
            .map_err(|e| ConfidentialError::InvalidGrant(format!("grant cache lock poisoned: {}", e)))
    }
}
