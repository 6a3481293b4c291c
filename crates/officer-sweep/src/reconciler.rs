use crate::directory::MembershipDirectory;
use access_guards::is_officer_qualified;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use guard_core::{PrincipalId, RoleId, RoleLadder};
use link_store::{SharedLinkStore, StoreError};
use prometheus_bridge::{EvictionReason, GuardMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// A member's roles before and after an update event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleChange {
    pub principal_id: PrincipalId,
    pub roles_before: BTreeSet<RoleId>,
    pub roles_after: BTreeSet<RoleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub checked: u64,
    pub evicted: u64,
    pub failures: u64,
}

enum Verdict {
    Keep,
    Evict(EvictionReason),
    Failed,
}

/// Evicts identity links whose principal is no longer officer-qualified.
pub struct Reconciler<D> {
    store: SharedLinkStore,
    directory: D,
    ladder: RoleLadder,
    metrics: GuardMetrics,
}

impl<D: MembershipDirectory> Reconciler<D> {
    pub fn new(
        store: SharedLinkStore,
        directory: D,
        ladder: RoleLadder,
        metrics: GuardMetrics,
    ) -> Self {
        Self {
            store,
            directory,
            ladder,
            metrics,
        }
    }

    pub fn store(&self) -> &SharedLinkStore {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn ladder(&self) -> &RoleLadder {
        &self.ladder
    }

    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// One sweep over a snapshot of the store. A link that cannot be
    /// evaluated or evicted is counted as a failure and the sweep moves on.
    pub async fn run_pass(&self) -> SweepReport {
        let mut report = SweepReport {
            started_at: Utc::now(),
            checked: 0,
            evicted: 0,
            failures: 0,
        };

        for link in self.store.snapshot().await {
            report.checked += 1;
            let reason = match self.evaluate(link.principal_id).await {
                Verdict::Keep => continue,
                Verdict::Failed => {
                    report.failures += 1;
                    continue;
                }
                Verdict::Evict(reason) => reason,
            };

            match self.store.remove(link.principal_id).await {
                Ok(true) => {
                    report.evicted += 1;
                    self.metrics.observe_eviction(reason);
                    info!(
                        principal = %link.principal_id,
                        vrchat_name = %link.external_name,
                        reason = reason.label(),
                        "evicted identity link"
                    );
                }
                Ok(false) => {}
                Err(err) => {
                    report.failures += 1;
                    error!(principal = %link.principal_id, error = %err, "failed to evict identity link");
                }
            }
        }

        self.metrics.observe_link_count(self.store.len().await);
        self.metrics.observe_pass(report.failures);
        report
    }

    async fn evaluate(&self, principal_id: PrincipalId) -> Verdict {
        let resolved = AssertUnwindSafe(async { self.directory.resolve(principal_id).await })
            .catch_unwind()
            .await;
        match resolved {
            Ok(Ok(Some(snapshot))) => {
                if is_officer_qualified(&self.ladder, Some(&snapshot.current_role_ids)) {
                    Verdict::Keep
                } else {
                    Verdict::Evict(EvictionReason::Unqualified)
                }
            }
            Ok(Ok(None)) => Verdict::Evict(EvictionReason::Absent),
            Ok(Err(err)) => {
                warn!(principal = %principal_id, error = %err, "membership lookup failed, treating principal as absent");
                Verdict::Evict(EvictionReason::Absent)
            }
            Err(_) => {
                error!(principal = %principal_id, "membership lookup panicked");
                Verdict::Failed
            }
        }
    }

    /// Removes the link right away when an update takes a member from
    /// officer-qualified to not qualified. Any other transition is ignored.
    pub async fn on_role_change(&self, change: &RoleChange) -> Result<bool, StoreError> {
        let was_officer = is_officer_qualified(&self.ladder, Some(&change.roles_before));
        let is_officer = is_officer_qualified(&self.ladder, Some(&change.roles_after));
        if !was_officer || is_officer {
            return Ok(false);
        }

        let removed = self.store.remove(change.principal_id).await?;
        if removed {
            self.metrics.observe_eviction(EvictionReason::RoleChange);
            info!(principal = %change.principal_id, "member lost officer roles, link removed");
        }
        self.metrics.observe_link_count(self.store.len().await);
        Ok(removed)
    }
}
