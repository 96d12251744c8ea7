use alloy_primitives::{Address, B256};
use certchain_core::CiphertextHandle;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct StoreInner {
    words: HashMap<CiphertextHandle, B256>,
    acl: HashMap<CiphertextHandle, HashSet<Address>>,
}

/// Plaintext behind every handle the simulated network knows about, plus
/// which accounts may decrypt it. Shared by the node, the relayer and the
/// registry so a handle minted by one is readable through the others.
#[derive(Debug, Clone, Default)]
pub struct CleartextStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl CleartextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: CiphertextHandle, word: B256) {
        self.lock().words.insert(handle, word);
    }

    pub fn get(&self, handle: &CiphertextHandle) -> Option<B256> {
        self.lock().words.get(handle).copied()
    }

    pub fn contains(&self, handle: &CiphertextHandle) -> bool {
        self.lock().words.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.lock().words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn allow(&self, handle: CiphertextHandle, account: Address) {
        self.lock().acl.entry(handle).or_default().insert(account);
    }

    pub fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.lock()
            .acl
            .get(handle)
            .is_some_and(|accounts| accounts.contains(account))
    }

    // A panic while holding the lock cannot leave a map half-updated, so a
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
