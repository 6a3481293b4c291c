use guard_core::{RoleId, RoleLadder};
use std::collections::BTreeSet;

/// True iff `roles` holds an officer-flagged role or the baseline member
/// role. `None` is an absent principal and never qualifies.
pub fn is_officer_qualified(ladder: &RoleLadder, roles: Option<&BTreeSet<RoleId>>) -> bool {
    roles.is_some_and(|roles| !roles.is_disjoint(&ladder.officer_roles()))
}

/// True iff `roles` holds any staff-flagged role. Officer status does not
/// imply staff status.
pub fn is_staff_qualified(ladder: &RoleLadder, roles: Option<&BTreeSet<RoleId>>) -> bool {
    roles.is_some_and(|roles| !roles.is_disjoint(&ladder.staff_roles()))
}
