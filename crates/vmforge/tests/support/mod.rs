//! Shared scaffolding for the scenario tests below: a fully wired
//! `Application` over a freshly migrated database, plus helpers to
//! build caller identities and drain the projection subscribers once.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use vmforge::Application;
use vmforge_config::VmforgeConfig;
use vmforge_crypto::{CredentialCipher, PlaintextCipher};
use vmforge_hypervisor::{HypervisorPort, SimulatedFault, SimulatedHypervisor};
use vmforge_projections::{TimelineProjection, VmRequestsProjection};
use vmforge_store::PgEventStore;
use vmforge_tenant::{CallerIdentity, Role, TenantScope};
use vmforge_types::{ProjectId, TenantId, UserId};

/// Builds an [`Application`] over `pool`, wired with a given hypervisor
/// double. `pool` is expected to already carry the schema from
/// `sqlx::test`'s per-test database, so this only adds this crate's
/// own tables on top.
pub async fn application(pool: PgPool, hypervisor: Box<dyn HypervisorPort>) -> Application {
    vmforge_store::ensure_schema(&pool).await.unwrap();
    vmforge_projections::ensure_schema(&pool).await.unwrap();

    let config = VmforgeConfig::default();
    let cipher: Box<dyn CredentialCipher> = Box::new(PlaintextCipher);
    Application::bootstrap(config, cipher, hypervisor, Box::new(vmforge_commands::NoQuota)).await.unwrap()
}

pub async fn application_with_happy_hypervisor(pool: PgPool) -> Application {
    application(pool, Box::new(SimulatedHypervisor::default())).await
}

pub async fn application_with_fault(pool: PgPool, fault: SimulatedFault) -> Application {
    application(pool, Box::new(SimulatedHypervisor::new(fault))).await
}

pub fn caller(tenant_id: TenantId, roles: Vec<Role>) -> CallerIdentity {
    CallerIdentity::new(UserId::new_v4(), tenant_id, format!("{}@example.com", uuid::Uuid::new_v4()), roles)
}

pub fn requester(tenant_id: TenantId) -> CallerIdentity {
    caller(tenant_id, vec![Role::User])
}

pub fn admin(tenant_id: TenantId) -> CallerIdentity {
    caller(tenant_id, vec![Role::Admin])
}

pub fn project_id() -> ProjectId {
    ProjectId::new_v4()
}

/// Runs the `vm_requests` and `timeline` projections against the
/// store's current contents for `timeout`, then cancels both. Long
/// enough to drain a handful of events from an idle poll loop, short
/// enough that a stuck subscriber doesn't hang the test suite.
pub async fn drain_projections(app: &Application, pool: &PgPool, store: &PgEventStore, timeout: Duration) {
    let cancel = CancellationToken::new();

    let vm_requests = vmforge_projections::Subscriber::new(
        pool.clone(),
        store.clone(),
        app.registry.clone(),
        Box::new(VmRequestsProjection::new()),
    );
    let timeline = vmforge_projections::Subscriber::new(
        pool.clone(),
        store.clone(),
        app.registry.clone(),
        Box::new(TimelineProjection::new()),
    );

    let vm_requests_cancel = cancel.clone();
    let timeline_cancel = cancel.clone();
    let vm_requests_handle = tokio::spawn(async move { vm_requests.run(vm_requests_cancel).await });
    let timeline_handle = tokio::spawn(async move { timeline.run(timeline_cancel).await });

    tokio::time::sleep(timeout).await;
    cancel.cancel();
    vm_requests_handle.await.unwrap().unwrap();
    timeline_handle.await.unwrap().unwrap();
}

pub async fn in_scope<F: std::future::Future>(identity: CallerIdentity, fut: F) -> F::Output {
    TenantScope::for_identity(identity).scope(fut).await
}

/// Whether a provisioning-progress row still exists for `request_id`.
/// Queried directly rather than through [`vmforge_projections::ProgressTracker::load`],
/// which can't distinguish "no row" from "a row with no stages yet".
pub async fn progress_row_exists(pool: &PgPool, request_id: vmforge_types::VmRequestId) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vm_provisioning_progress WHERE request_id = $1")
        .bind(request_id.as_uuid())
        .fetch_one(pool)
        .await
        .unwrap()
        > 0
}
