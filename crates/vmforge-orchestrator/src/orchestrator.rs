use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vmforge_codec::{CodecRegistry, DomainEvent, VmRequestEvent};
use vmforge_hypervisor::{HypervisorPort, ProvisionedVm, VmSpec};
use vmforge_kernel::{DomainError, RuntimeError, Vm, VmCommand, VmRequest, VmRequestCommand};
use vmforge_projections::{append_timeline_entry, ProgressTracker, ProjectionHandler, VmwareConfigurationStore};
use vmforge_store::{EventMetadata, PgEventStore, StoredEvent};
use vmforge_types::{CorrelationId, TenantId, VmId, VmRequestId};

use crate::error::OrchestratorError;
use crate::naming::{derive_vm_id, effective_vm_name};
use crate::progress_sink::{system_actor, OrchestratorProgressSink};

/// The budget for one `create_vm` call, including every stage it
/// walks. Sum of the seed per-stage costs (215s) plus buffer — must
/// exceed whatever internal waits the hypervisor port performs, per
/// the nested-deadline rule: the outer budget always exceeds the sum
/// of inner ones.
const OUTER_PROVISIONING_BUDGET: Duration = Duration::from_secs(300);

/// Default staleness window before a restarted orchestrator considers
/// re-driving a request stuck in PROVISIONING.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Drives one request's provisioning to completion or failure. Reacts
/// to `VmRequestApproved` as a [`ProjectionHandler`] subscriber (the
/// projection engine is the dispatch substrate, per the engine's own
/// design), then runs the full clone/progress/reconcile sequence
/// against the external hypervisor.
pub struct ProvisioningOrchestrator {
    store: PgEventStore,
    registry: CodecRegistry,
    pool: PgPool,
    vmware_config: VmwareConfigurationStore,
    progress: ProgressTracker,
    hypervisor: Box<dyn HypervisorPort>,
    shutdown: CancellationToken,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: PgEventStore,
        registry: CodecRegistry,
        pool: PgPool,
        vmware_config: VmwareConfigurationStore,
        progress: ProgressTracker,
        hypervisor: Box<dyn HypervisorPort>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { store, registry, pool, vmware_config, progress, hypervisor, shutdown }
    }

    /// Runs the full algorithm for one request: load configuration and
    /// summary, compute the effective name, drive the hypervisor, and
    /// reconcile both aggregates on the outcome. Safe to call again on
    /// a request already in PROVISIONING — every mutating step treats
    /// "already in the target state" as a no-op rather than an error,
    /// so resuming after a restart replays cleanly.
    pub async fn run(&self, tenant_id: TenantId, request_id: VmRequestId) -> Result<(), OrchestratorError> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        self.mark_provisioning(tenant_id, request_id).await?;

        let config = match self.vmware_config.load(tenant_id).await? {
            Some(c) => c,
            None => return self.fail(tenant_id, request_id, None, "VMware configuration missing").await,
        };

        let (request, _version) = vmforge_kernel::load::<VmRequest>(&self.store, &self.registry, tenant_id, request_id.as_uuid())
            .await
            .map_err(|e| OrchestratorError::Kernel(e.to_string()))?;
        let Some(core) = request.created else {
            return self.fail(tenant_id, request_id, None, "VmRequest summary missing").await;
        };

        let effective_name = effective_vm_name(&core.project_name, &core.vm_name);
        let vm_id = derive_vm_id(request_id);

        self.start_vm(tenant_id, request_id, vm_id, &effective_name, core.size).await?;

        let spec = VmSpec {
            effective_name: effective_name.clone(),
            size: core.size,
            cluster: config.cluster.clone(),
            datastore: config.datastore.clone(),
            network: config.network.clone(),
            template: config.template.clone(),
        };
        let sink = OrchestratorProgressSink {
            tenant_id,
            request_id,
            vm_id,
            store: &self.store,
            registry: &self.registry,
            progress: &self.progress,
        };

        tokio::select! {
            () = self.shutdown.cancelled() => Err(OrchestratorError::Cancelled),
            outcome = tokio::time::timeout(OUTER_PROVISIONING_BUDGET, self.hypervisor.create_vm(&spec, &sink)) => {
                match outcome {
                    Ok(Ok(provisioned)) => self.succeed(tenant_id, request_id, vm_id, provisioned).await,
                    Ok(Err(provision_err)) => self.fail(tenant_id, request_id, Some(vm_id), &provision_err.to_string()).await,
                    Err(_elapsed) => self.fail(tenant_id, request_id, Some(vm_id), "provisioning timed out").await,
                }
            }
        }
    }

    /// Scans for requests stuck in PROVISIONING past `stall_threshold`
    /// and re-drives them. An operational policy, not a correctness
    /// requirement: a request found here already failed to make
    /// progress once, so there's no guarantee re-driving succeeds.
    pub async fn resume_stalled(
        &self,
        tenant_id: TenantId,
        stall_threshold: Duration,
    ) -> Result<Vec<VmRequestId>, OrchestratorError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stall_threshold).unwrap_or_else(|_| chrono::Duration::minutes(15));

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT r.request_id
            FROM vm_requests_projection r
            LEFT JOIN vm_provisioning_progress p ON p.request_id = r.request_id
            WHERE r.tenant_id = $1 AND r.status = 'PROVISIONING'
              AND COALESCE(p.updated_at, r.created_at) < $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut resumed = Vec::with_capacity(rows.len());
        for (raw_id,) in rows {
            let request_id = VmRequestId::from_uuid(raw_id);
            tracing::warn!(request_id = %request_id, "resuming stalled provisioning");
            if let Err(e) = self.run(tenant_id, request_id).await {
                tracing::error!(request_id = %request_id, error = %e, "stalled resume attempt failed");
            }
            resumed.push(request_id);
        }
        Ok(resumed)
    }

    async fn mark_provisioning(&self, tenant_id: TenantId, request_id: VmRequestId) -> Result<(), OrchestratorError> {
        let metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        match vmforge_kernel::execute::<VmRequest>(
            &self.store,
            &self.registry,
            tenant_id,
            request_id.as_uuid(),
            VmRequestCommand::MarkProvisioning,
            metadata,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(RuntimeError::Domain(DomainError::InvalidState { .. })) => {
                tracing::debug!(request_id = %request_id, "request already provisioning, resuming in place");
                Ok(())
            }
            Err(e) => Err(OrchestratorError::Kernel(e.to_string())),
        }
    }

    async fn start_vm(
        &self,
        tenant_id: TenantId,
        request_id: VmRequestId,
        vm_id: VmId,
        effective_name: &str,
        size: vmforge_types::VmSize,
    ) -> Result<(), OrchestratorError> {
        let metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        let command = VmCommand::StartProvisioning { request_id, tenant_id, name: effective_name.to_string(), size };
        match vmforge_kernel::execute::<Vm>(&self.store, &self.registry, tenant_id, vm_id.as_uuid(), command, metadata).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::Domain(DomainError::InvalidState { .. })) => {
                tracing::debug!(request_id = %request_id, vm_id = %vm_id, "vm already provisioning, resuming in place");
                Ok(())
            }
            Err(e) => Err(OrchestratorError::Kernel(e.to_string())),
        }
    }

    async fn succeed(
        &self,
        tenant_id: TenantId,
        request_id: VmRequestId,
        vm_id: VmId,
        provisioned: ProvisionedVm,
    ) -> Result<(), OrchestratorError> {
        let vm_metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        let vm_command = VmCommand::CompleteProvisioning {
            vmware_vm_id: provisioned.vmware_vm_id.clone(),
            ip_address: provisioned.ip_address.clone(),
            hostname: provisioned.hostname.clone(),
            power_state: provisioned.power_state.clone(),
            guest_os: provisioned.guest_os.clone(),
        };
        if let Err(e) =
            vmforge_kernel::execute::<Vm>(&self.store, &self.registry, tenant_id, vm_id.as_uuid(), vm_command, vm_metadata).await
        {
            tracing::error!(
                request_id = %request_id, vm_id = %vm_id, error = %e, critical = true,
                "CRITICAL: system in inconsistent state at step 1 (VmProvisioned append failed)"
            );
            return Err(OrchestratorError::Kernel(e.to_string()));
        }

        let request_metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        let request_command = VmRequestCommand::MarkReady {
            vmware_vm_id: provisioned.vmware_vm_id.clone(),
            ip_address: provisioned.ip_address.clone(),
            hostname: provisioned.hostname.clone(),
        };
        if let Err(e) = vmforge_kernel::execute::<VmRequest>(
            &self.store,
            &self.registry,
            tenant_id,
            request_id.as_uuid(),
            request_command,
            request_metadata,
        )
        .await
        {
            tracing::error!(
                request_id = %request_id, vm_id = %vm_id, error = %e, critical = true,
                "CRITICAL: system in inconsistent state at step 2 (VmProvisioned committed, VmRequestReady append failed)"
            );
            return Err(OrchestratorError::Kernel(e.to_string()));
        }

        append_timeline_entry(
            &self.pool,
            request_id.as_uuid(),
            tenant_id,
            "VM_READY",
            "system",
            &format!("vm {} ({}) is ready", provisioned.vmware_vm_id, provisioned.hostname),
            Utc::now(),
        )
        .await?;

        self.progress.delete(request_id.as_uuid()).await?;
        Ok(())
    }

    async fn fail(
        &self,
        tenant_id: TenantId,
        request_id: VmRequestId,
        vm_id: Option<VmId>,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        if let Some(vm_id) = vm_id {
            let metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
            let command = VmCommand::FailProvisioning { reason: reason.to_string() };
            if let Err(e) = vmforge_kernel::execute::<Vm>(&self.store, &self.registry, tenant_id, vm_id.as_uuid(), command, metadata).await
            {
                tracing::error!(request_id = %request_id, vm_id = %vm_id, error = %e, "failed to append VmProvisioningFailed");
            }
        }

        let metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        let command = VmRequestCommand::MarkFailed { reason: reason.to_string() };
        vmforge_kernel::execute::<VmRequest>(&self.store, &self.registry, tenant_id, request_id.as_uuid(), command, metadata)
            .await
            .map_err(|e| OrchestratorError::Kernel(e.to_string()))?;

        append_timeline_entry(&self.pool, request_id.as_uuid(), tenant_id, "PROVISIONING_FAILED", "system", reason, Utc::now())
            .await?;

        self.progress.delete(request_id.as_uuid()).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectionHandler for ProvisioningOrchestrator {
    fn name(&self) -> &'static str {
        "provisioning_orchestrator"
    }

    // Doesn't write through `tx`: the full provisioning run spans an
    // external hypervisor call that can take up to
    // `OUTER_PROVISIONING_BUDGET`, far too long to hold a transaction
    // open across. Its own appends commit independently through the
    // kernel and `self.pool`; `resume_stalled` is the compensating
    // mechanism for a reaction that dies before finishing.
    async fn handle(&self, _tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, stored: &StoredEvent, event: &DomainEvent) -> Result<(), anyhow::Error> {
        let DomainEvent::VmRequest(VmRequestEvent::Approved { .. }) = event else {
            return Ok(());
        };
        let request_id = VmRequestId::from_uuid(stored.aggregate_id);
        self.run(stored.tenant_id, request_id).await.map_err(Into::into)
    }
}
