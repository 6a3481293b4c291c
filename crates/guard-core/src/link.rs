use crate::ids::{PrincipalId, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Association between a guild member and their VRChat username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityLink {
    pub principal_id: PrincipalId,
    pub external_name: String,
}

impl IdentityLink {
    pub fn new(principal_id: PrincipalId, external_name: impl Into<String>) -> Self {
        Self {
            principal_id,
            external_name: external_name.into(),
        }
    }
}

/// Roles held by a principal at the moment of one evaluation. Never cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrincipalSnapshot {
    pub principal_id: PrincipalId,
    pub current_role_ids: BTreeSet<RoleId>,
}

impl PrincipalSnapshot {
    pub fn new(principal_id: PrincipalId, roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            principal_id,
            current_role_ids: roles.into_iter().collect(),
        }
    }
}
