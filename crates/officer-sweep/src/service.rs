use crate::directory::MembershipDirectory;
use crate::reconciler::{Reconciler, RoleChange};
use crate::schedule::{start_reconciliation_loop, SweepHandle};
use access_guards::{Capability, CommandGate, GateDecision, InvocationContext};
use guard_core::{ChannelId, GuildId, PrincipalId};
use link_store::{SharedLinkStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Everything the command layer needs, wired explicitly at startup.
pub struct LinkService<D> {
    gate: CommandGate,
    reconciler: Arc<Reconciler<D>>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl<D: MembershipDirectory + 'static> LinkService<D> {
    pub fn new(reconciler: Reconciler<D>) -> Self {
        let gate = CommandGate::new(reconciler.ladder().clone());
        Self {
            gate,
            reconciler: Arc::new(reconciler),
            sweep: Mutex::new(None),
        }
    }

    fn store(&self) -> &SharedLinkStore {
        self.reconciler.store()
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<D>> {
        &self.reconciler
    }

    pub fn gate(&self) -> &CommandGate {
        &self.gate
    }

    pub async fn add_link(
        &self,
        principal_id: PrincipalId,
        external_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.store().upsert(principal_id, external_name).await?;
        self.reconciler
            .metrics()
            .observe_link_count(self.store().len().await);
        Ok(())
    }

    pub async fn remove_link(&self, principal_id: PrincipalId) -> Result<bool, StoreError> {
        let removed = self.store().remove(principal_id).await?;
        self.reconciler
            .metrics()
            .observe_link_count(self.store().len().await);
        Ok(removed)
    }

    pub async fn lookup_by_principal(&self, principal_id: PrincipalId) -> Option<String> {
        self.store().lookup_by_principal(principal_id).await
    }

    pub async fn lookup_by_external_name(&self, external_name: &str) -> Option<PrincipalId> {
        self.store().lookup_by_external_name(external_name).await
    }

    pub fn authorize(&self, capabilities: &[Capability], ctx: &InvocationContext) -> GateDecision {
        self.gate.authorize_all(capabilities, ctx)
    }

    /// Resolves the invoker's current roles and runs the gate. A failed
    /// lookup counts as an absent principal.
    pub async fn authorize_principal(
        &self,
        capabilities: &[Capability],
        principal_id: PrincipalId,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    ) -> GateDecision {
        let roles = match self.reconciler.directory().resolve(principal_id).await {
            Ok(snapshot) => snapshot.map(|s| s.current_role_ids),
            Err(err) => {
                warn!(principal = %principal_id, error = %err, "could not resolve invoker roles");
                None
            }
        };
        let ctx = InvocationContext::new(roles, channel_id, guild_id);
        self.gate.authorize_all(capabilities, &ctx)
    }

    pub async fn on_role_change(&self, change: &RoleChange) -> Result<bool, StoreError> {
        self.reconciler.on_role_change(change).await
    }

    /// Starts the periodic sweep. Returns `false` if one is already running.
    pub async fn start_reconciliation_loop<R>(&self, interval: Duration, ready: R) -> bool
    where
        R: Future<Output = ()> + Send + 'static,
    {
        let mut sweep = self.sweep.lock().await;
        if sweep.as_ref().is_some_and(SweepHandle::is_running) {
            return false;
        }
        *sweep = Some(start_reconciliation_loop(
            Arc::clone(&self.reconciler),
            interval,
            ready,
        ));
        true
    }

    pub async fn stop_reconciliation_loop(&self) {
        let handle = self.sweep.lock().await.take();
        match handle {
            Some(handle) => handle.stop().await,
            None => info!("reconciliation loop was not running"),
        }
    }

    pub async fn is_sweeping(&self) -> bool {
        self.sweep
            .lock()
            .await
            .as_ref()
            .is_some_and(SweepHandle::is_running)
    }
}
