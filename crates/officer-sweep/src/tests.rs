use crate::{
    DirectoryError, InMemoryDirectory, LinkService, LoopState, MembershipDirectory, Reconciler,
    ResolveFuture, RoleChange,
};
use access_guards::{Capability, DenialKind, GateDecision};
use futures::FutureExt;
use guard_core::{ChannelId, GuildId, PrincipalId, RoleId, RoleLadder, RoleLadderEntry};
use link_store::{IdentityLinkStore, SharedLinkStore};
use prometheus::Registry;
use prometheus_bridge::{EvictionReason, GuardMetrics};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const OFFICER: RoleId = RoleId(7);
const MEMBER: RoleId = RoleId(100);
const STAFF: RoleId = RoleId(8);
const GUEST: RoleId = RoleId(9);

fn ladder() -> RoleLadder {
    RoleLadder::new(
        vec![
            RoleLadderEntry {
                role_id: OFFICER,
                is_officer: true,
                is_staff_role: false,
            },
            RoleLadderEntry {
                role_id: STAFF,
                is_officer: false,
                is_staff_role: true,
            },
        ],
        MEMBER,
    )
}

fn metrics() -> GuardMetrics {
    GuardMetrics::new(Registry::new()).unwrap()
}

async fn store_with(dir: &TempDir, links: &[(u64, &str)]) -> SharedLinkStore {
    let store = SharedLinkStore::new(
        IdentityLinkStore::load(dir.path().join("vrc_name_db.csv")).unwrap(),
    );
    for (id, name) in links {
        store.upsert(PrincipalId(*id), *name).await.unwrap();
    }
    store
}

fn set(roles: &[RoleId]) -> BTreeSet<RoleId> {
    roles.iter().copied().collect()
}

/// Panics for one principal, answers "absent" for everyone else.
struct FlakyDirectory {
    panics_for: PrincipalId,
}

impl MembershipDirectory for FlakyDirectory {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_> {
        let panics_for = self.panics_for;
        async move {
            if principal_id == panics_for {
                panic!("directory blew up");
            }
            Ok::<_, DirectoryError>(None)
        }
        .boxed()
    }
}

/// Panics while building the lookup, before any future exists.
struct EagerPanicDirectory;

impl MembershipDirectory for EagerPanicDirectory {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_> {
        panic!("no lookup possible for {principal_id}");
    }
}

#[tokio::test]
async fn pass_evicts_departed_members_and_keeps_officers() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b")]).await;
    let directory = InMemoryDirectory::new();
    directory.insert(PrincipalId(2), [OFFICER]);

    let reconciler = Reconciler::new(store.clone(), directory, ladder(), metrics());
    let report = reconciler.run_pass().await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.evicted, 1);
    assert_eq!(report.failures, 0);
    let remaining = store.snapshot().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].principal_id, PrincipalId(2));
    assert_eq!(remaining[0].external_name, "b");
    assert_eq!(reconciler.metrics().evictions(EvictionReason::Absent), 1);
}

#[tokio::test]
async fn pass_evicts_members_without_officer_roles() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b"), (3, "c")]).await;
    let directory = InMemoryDirectory::new();
    directory.insert(PrincipalId(1), [GUEST, STAFF]);
    directory.insert(PrincipalId(2), [MEMBER]);
    directory.insert(PrincipalId(3), [OFFICER, GUEST]);

    let reconciler = Reconciler::new(store.clone(), directory, ladder(), metrics());
    let report = reconciler.run_pass().await;

    assert_eq!(report.evicted, 1);
    assert_eq!(store.lookup_by_principal(PrincipalId(1)).await, None);
    assert_eq!(store.len().await, 2);
    assert_eq!(reconciler.metrics().evictions(EvictionReason::Unqualified), 1);
    assert_eq!(reconciler.metrics().identity_links_total.get(), 2);
}

#[tokio::test]
async fn unreachable_directory_counts_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a")]).await;
    let directory = InMemoryDirectory::new();
    directory.insert(PrincipalId(1), [OFFICER]);
    directory.set_unreachable(PrincipalId(1), true);

    let reconciler = Reconciler::new(store.clone(), directory, ladder(), metrics());
    let report = reconciler.run_pass().await;

    assert_eq!(report.evicted, 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn panicking_lookup_does_not_abort_pass() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b"), (3, "c")]).await;
    let directory = FlakyDirectory {
        panics_for: PrincipalId(2),
    };

    let reconciler = Reconciler::new(store.clone(), directory, ladder(), metrics());
    let report = reconciler.run_pass().await;

    assert_eq!(report.checked, 3);
    assert_eq!(report.failures, 1);
    assert_eq!(report.evicted, 2);
    let ids: Vec<_> = store.snapshot().await.iter().map(|l| l.principal_id).collect();
    assert_eq!(ids, vec![PrincipalId(2)]);
}

#[tokio::test]
async fn eager_lookup_panic_keeps_links() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b")]).await;
    let reconciler = Reconciler::new(store.clone(), EagerPanicDirectory, ladder(), metrics());

    let report = reconciler.run_pass().await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.failures, 2);
    assert_eq!(report.evicted, 0);
    assert_eq!(store.len().await, 2);
    assert_eq!(reconciler.metrics().reconciliation_failures_total.get(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_and_sweeps_keep_file_in_step() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[]).await;
    let directory = InMemoryDirectory::new();
    for id in (0..20u64).step_by(2) {
        directory.insert(PrincipalId(id), [OFFICER]);
    }
    let reconciler = Arc::new(Reconciler::new(store.clone(), directory, ladder(), metrics()));

    let mut tasks = Vec::new();
    for worker in 0..8u64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..25u64 {
                let id = PrincipalId((worker * 7 + step) % 20);
                if step % 3 == 0 {
                    store.remove(id).await.unwrap();
                } else {
                    store.upsert(id, format!("w{worker}-s{step}")).await.unwrap();
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for _ in 0..4 {
        let reconciler = Arc::clone(&reconciler);
        tasks.push(tokio::spawn(async move {
            let report = reconciler.run_pass().await;
            assert_eq!(report.failures, 0);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let in_memory = store.snapshot().await;
    let principals: BTreeSet<PrincipalId> = in_memory.iter().map(|l| l.principal_id).collect();
    assert_eq!(principals.len(), in_memory.len());

    let reloaded = IdentityLinkStore::load(dir.path().join("vrc_name_db.csv")).unwrap();
    assert_eq!(reloaded.snapshot(), in_memory);
}

#[tokio::test]
async fn persist_failures_are_counted_per_link() {
    let dir = TempDir::new().unwrap();
    let db_dir = dir.path().join("db");
    std::fs::create_dir(&db_dir).unwrap();
    let store = SharedLinkStore::new(IdentityLinkStore::load(db_dir.join("links.csv")).unwrap());
    store.upsert(PrincipalId(1), "a").await.unwrap();
    store.upsert(PrincipalId(2), "b").await.unwrap();
    std::fs::remove_dir_all(&db_dir).unwrap();

    let reconciler = Reconciler::new(store.clone(), InMemoryDirectory::new(), ladder(), metrics());
    let report = reconciler.run_pass().await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.failures, 2);
    assert_eq!(report.evicted, 0);
    assert_eq!(store.len().await, 2);
    assert_eq!(reconciler.metrics().reconciliation_failures_total.get(), 2);
}

#[tokio::test]
async fn role_change_evicts_only_on_lost_qualification() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b")]).await;
    let reconciler = Reconciler::new(store.clone(), InMemoryDirectory::new(), ladder(), metrics());

    let promoted = RoleChange {
        principal_id: PrincipalId(2),
        roles_before: set(&[GUEST]),
        roles_after: set(&[OFFICER]),
    };
    assert!(!reconciler.on_role_change(&promoted).await.unwrap());

    let reshuffled = RoleChange {
        principal_id: PrincipalId(2),
        roles_before: set(&[OFFICER]),
        roles_after: set(&[MEMBER, STAFF]),
    };
    assert!(!reconciler.on_role_change(&reshuffled).await.unwrap());
    assert_eq!(store.len().await, 2);

    let demoted = RoleChange {
        principal_id: PrincipalId(1),
        roles_before: set(&[OFFICER, STAFF]),
        roles_after: set(&[STAFF]),
    };
    assert!(reconciler.on_role_change(&demoted).await.unwrap());
    assert!(!reconciler.on_role_change(&demoted).await.unwrap());
    assert_eq!(store.lookup_by_principal(PrincipalId(1)).await, None);
    assert_eq!(reconciler.metrics().evictions(EvictionReason::RoleChange), 1);
}

#[tokio::test(start_paused = true)]
async fn loop_sweeps_on_every_interval_until_stopped() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a"), (2, "b")]).await;
    let directory = InMemoryDirectory::new();
    directory.insert(PrincipalId(2), [OFFICER]);

    let service = LinkService::new(Reconciler::new(
        store.clone(),
        directory.clone(),
        ladder(),
        metrics(),
    ));
    assert!(
        service
            .start_reconciliation_loop(Duration::from_secs(3600), async {})
            .await
    );
    assert!(
        !service
            .start_reconciliation_loop(Duration::from_secs(3600), async {})
            .await
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.len().await, 1);
    assert_eq!(
        service
            .reconciler()
            .metrics()
            .reconciliation_passes_total
            .get(),
        1
    );

    directory.remove(PrincipalId(2));
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(store.is_empty().await);
    assert_eq!(
        service
            .reconciler()
            .metrics()
            .reconciliation_passes_total
            .get(),
        2
    );

    service.stop_reconciliation_loop().await;
    assert!(!service.is_sweeping().await);
}

#[tokio::test]
async fn stop_interrupts_sleep_promptly() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[]).await;
    let reconciler = Arc::new(Reconciler::new(
        store,
        InMemoryDirectory::new(),
        ladder(),
        metrics(),
    ));

    let handle =
        crate::start_reconciliation_loop(reconciler, Duration::from_secs(3600), async {});
    let mut state = handle.subscribe_state();
    state
        .wait_for(|s| *s == LoopState::Sleeping)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("loop should stop without waiting out the interval");
    assert_eq!(*state.borrow(), LoopState::Stopped);
}

#[tokio::test]
async fn loop_waits_for_ready_and_can_stop_before_it() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a")]).await;
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        InMemoryDirectory::new(),
        ladder(),
        metrics(),
    ));
    let (_ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();

    let handle = crate::start_reconciliation_loop(
        reconciler.clone(),
        Duration::from_secs(3600),
        async move {
            let _ = ready_rx.await;
        },
    );
    tokio::task::yield_now().await;
    assert_eq!(handle.state(), LoopState::WaitingForReady);

    let mut state = handle.subscribe_state();
    handle.stop().await;
    assert_eq!(*state.borrow_and_update(), LoopState::Stopped);
    assert_eq!(store.len().await, 1);
    assert_eq!(reconciler.metrics().reconciliation_passes_total.get(), 0);
}

#[tokio::test]
async fn crashed_loop_is_not_reported_as_sweeping() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[(1, "a")]).await;
    let service = LinkService::new(Reconciler::new(
        store,
        InMemoryDirectory::new(),
        ladder(),
        metrics(),
    ));

    assert!(
        service
            .start_reconciliation_loop(Duration::from_secs(3600), async {
                panic!("client failed before ready");
            })
            .await
    );
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.is_sweeping().await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let (_ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    assert!(
        service
            .start_reconciliation_loop(Duration::from_secs(3600), async move {
                let _ = ready_rx.await;
            })
            .await
    );
    assert!(service.is_sweeping().await);
    service.stop_reconciliation_loop().await;
    assert!(!service.is_sweeping().await);
}

#[tokio::test]
async fn service_links_and_gates_commands() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, &[]).await;
    let directory = InMemoryDirectory::new();
    directory.insert(PrincipalId(42), [OFFICER]);
    directory.insert(PrincipalId(43), [GUEST]);
    let service = LinkService::new(Reconciler::new(store, directory, ladder(), metrics()));

    service.add_link(PrincipalId(42), "Alice").await.unwrap();
    service.add_link(PrincipalId(42), "Bob").await.unwrap();
    assert_eq!(service.lookup_by_principal(PrincipalId(42)).await.as_deref(), Some("Bob"));
    assert_eq!(service.lookup_by_external_name("Alice").await, None);
    assert_eq!(service.reconciler().metrics().identity_links_total.get(), 1);

    let required = [Capability::MpsOnly, Capability::GuildOnly];
    let allowed = service
        .authorize_principal(&required, PrincipalId(42), ChannelId(1), Some(GuildId(9)))
        .await;
    assert_eq!(allowed, GateDecision::Allow);

    let denied = service
        .authorize_principal(&required, PrincipalId(43), ChannelId(1), Some(GuildId(9)))
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(denied.kind, DenialKind::OfficerOnly);

    let stranger = service
        .authorize_principal(&required, PrincipalId(99), ChannelId(1), Some(GuildId(9)))
        .await;
    assert!(!stranger.is_allowed());

    assert!(service.remove_link(PrincipalId(42)).await.unwrap());
    assert!(!service.remove_link(PrincipalId(42)).await.unwrap());
    assert_eq!(service.reconciler().metrics().identity_links_total.get(), 0);
}
