use std::sync::{Arc, RwLock};
use async_trait::async_trait;
use crate::error::StoreError;
use crate::grant::{Grant, GrantMap};
use crate::store::GrantStore;
use crate::types::SubjectId;

/// In-memory store implementation for tests and demos.
///
/// Clones share the same grants, so a test can keep a handle after moving the
/// store into an engine.
#[derive(Debug, Default, Clone)]
pub struct MemoryGrantStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    grants: RwLock<GrantMap>,
    fail_writes: RwLock<bool>,
}

fn poisoned() -> StoreError {
    "poisoned lock".into()
}

impl MemoryGrantStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `grants`.
    pub fn with_grants(grants: GrantMap) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.inner.grants.write() {
            *guard = grants;
        }
        store
    }

    /// Makes every subsequent `put`/`remove` fail, simulating a storage outage.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.inner.fail_writes.write() {
            *guard = fail;
        }
    }

    /// Returns a copy of the current grants.
    pub fn snapshot(&self) -> GrantMap {
        self.inner
            .grants
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn check_writable(&self) -> std::result::Result<(), StoreError> {
        let fail = *self.inner.fail_writes.read().map_err(|_| poisoned())?;
        if fail {
            return Err("store writes disabled".into());
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn get(&self, subject: &SubjectId) -> std::result::Result<Option<Grant>, StoreError> {
        let guard = self.inner.grants.read().map_err(|_| poisoned())?;
        Ok(guard.get(subject).cloned())
    }

    async fn put(&self, subject: SubjectId, grant: Grant) -> std::result::Result<(), StoreError> {
        self.check_writable()?;
        let mut guard = self.inner.grants.write().map_err(|_| poisoned())?;
        guard.insert(subject, grant);
        Ok(())
    }

    async fn remove(
        &self,
        subject: &SubjectId,
    ) -> std::result::Result<Option<Grant>, StoreError> {
        self.check_writable()?;
        let mut guard = self.inner.grants.write().map_err(|_| poisoned())?;
        Ok(guard.remove(subject))
    }

    async fn all(&self) -> std::result::Result<Vec<(SubjectId, Grant)>, StoreError> {
        let guard = self.inner.grants.read().map_err(|_| poisoned())?;
        Ok(guard.to_vec())
    }
}
