use futures::future::{self, BoxFuture};
use futures::FutureExt;
use guard_core::{PrincipalId, PrincipalSnapshot, RoleId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("membership directory unavailable: {0}")]
    Unavailable(String),
}

pub type ResolveFuture<'a> = BoxFuture<'a, Result<Option<PrincipalSnapshot>, DirectoryError>>;

/// Source of current guild membership. `Ok(None)` means the principal is not
/// a member; `Err` means the lookup itself failed.
pub trait MembershipDirectory: Send + Sync {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_>;
}

impl<D: MembershipDirectory + ?Sized> MembershipDirectory for Arc<D> {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_> {
        (**self).resolve(principal_id)
    }
}

#[derive(Debug, Default)]
struct Members {
    roles: HashMap<PrincipalId, BTreeSet<RoleId>>,
    unreachable: HashSet<PrincipalId>,
}

/// Membership held in process memory. The daemon refreshes it from a
/// snapshot file; tests drive it directly.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    members: Arc<RwLock<Members>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal_id: PrincipalId, roles: impl IntoIterator<Item = RoleId>) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.roles.insert(principal_id, roles.into_iter().collect());
    }

    pub fn remove(&self, principal_id: PrincipalId) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.roles.remove(&principal_id);
    }

    /// Swaps in a complete membership listing.
    pub fn replace_all(&self, roles: HashMap<PrincipalId, BTreeSet<RoleId>>) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.roles = roles;
    }

    /// Makes lookups for `principal_id` fail until cleared.
    pub fn set_unreachable(&self, principal_id: PrincipalId, unreachable: bool) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        if unreachable {
            members.unreachable.insert(principal_id);
        } else {
            members.unreachable.remove(&principal_id);
        }
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .roles
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MembershipDirectory for InMemoryDirectory {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_> {
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        let result = if members.unreachable.contains(&principal_id) {
            Err(DirectoryError::Unavailable(format!(
                "no answer for principal {principal_id}"
            )))
        } else {
            Ok(members
                .roles
                .get(&principal_id)
                .map(|roles| PrincipalSnapshot::new(principal_id, roles.iter().copied())))
        };
        future::ready(result).boxed()
    }
}
