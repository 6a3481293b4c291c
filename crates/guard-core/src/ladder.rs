use crate::ids::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One rung of the configured role ladder. Unknown keys (e.g. `name`) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleLadderEntry {
    #[serde(rename = "id")]
    pub role_id: RoleId,
    #[serde(default)]
    pub is_officer: bool,
    #[serde(default)]
    pub is_staff_role: bool,
}

/// Read-only role configuration: the ladder plus the baseline member role
/// that counts as officer-qualified on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleLadder {
    pub entries: Vec<RoleLadderEntry>,
    pub member_role: RoleId,
}

impl RoleLadder {
    pub fn new(entries: Vec<RoleLadderEntry>, member_role: RoleId) -> Self {
        Self {
            entries,
            member_role,
        }
    }

    /// Officer-flagged roles together with the baseline member role.
    pub fn officer_roles(&self) -> BTreeSet<RoleId> {
        let mut roles: BTreeSet<RoleId> = self
            .entries
            .iter()
            .filter(|e| e.is_officer)
            .map(|e| e.role_id)
            .collect();
        roles.insert(self.member_role);
        roles
    }

    pub fn staff_roles(&self) -> BTreeSet<RoleId> {
        self.entries
            .iter()
            .filter(|e| e.is_staff_role)
            .map(|e| e.role_id)
            .collect()
    }

    pub fn duplicate_roles(&self) -> Vec<RoleId> {
        let mut seen = BTreeSet::new();
        let mut dupes = Vec::new();
        for entry in &self.entries {
            if !seen.insert(entry.role_id) && !dupes.contains(&entry.role_id) {
                dupes.push(entry.role_id);
            }
        }
        dupes
    }
}
