use crate::store::{IdentityLinkStore, StoreError};
use guard_core::{IdentityLink, PrincipalId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cloneable handle that serializes all access to one store. Command
/// handlers, role-change events and the periodic sweep all go through it.
#[derive(Clone, Debug)]
pub struct SharedLinkStore {
    inner: Arc<Mutex<IdentityLinkStore>>,
}

impl SharedLinkStore {
    pub fn new(store: IdentityLinkStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn lookup_by_principal(&self, principal_id: PrincipalId) -> Option<String> {
        self.inner
            .lock()
            .await
            .lookup_by_principal(principal_id)
            .map(str::to_owned)
    }

    pub async fn lookup_by_external_name(&self, external_name: &str) -> Option<PrincipalId> {
        self.inner.lock().await.lookup_by_external_name(external_name)
    }

    pub async fn upsert(
        &self,
        principal_id: PrincipalId,
        external_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.inner.lock().await.upsert(principal_id, external_name)
    }

    pub async fn remove(&self, principal_id: PrincipalId) -> Result<bool, StoreError> {
        self.inner.lock().await.remove(principal_id)
    }

    pub async fn snapshot(&self) -> Vec<IdentityLink> {
        self.inner.lock().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
