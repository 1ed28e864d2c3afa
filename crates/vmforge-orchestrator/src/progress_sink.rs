use async_trait::async_trait;
use chrono::Utc;
use vmforge_codec::CodecRegistry;
use vmforge_hypervisor::ProvisioningProgressSink;
use vmforge_kernel::{Vm, VmCommand};
use vmforge_projections::{ProgressTracker, StageTimestamp};
use vmforge_store::{EventMetadata, PgEventStore};
use vmforge_types::{CorrelationId, Stage, TenantId, UserId, VmId, VmRequestId};

/// Events the orchestrator drives have no human actor — this is the
/// fixed identity attached to events it appends on its own initiative
/// (progress updates, the terminal success/failure events).
pub fn system_actor() -> UserId {
    UserId::from_uuid(uuid::Uuid::nil())
}

/// Bridges hypervisor stage callbacks into the two places they need to
/// land: the `vm_provisioning_progress` projection (for the UI to
/// poll) and the `Vm` aggregate's own event stream (for replay and
/// audit). A failure merging progress or appending the event is logged
/// and swallowed here — the hypervisor clone itself must not fail
/// because a progress write had a hiccup.
pub struct OrchestratorProgressSink<'a> {
    pub tenant_id: TenantId,
    pub request_id: VmRequestId,
    pub vm_id: VmId,
    pub store: &'a PgEventStore,
    pub registry: &'a CodecRegistry,
    pub progress: &'a ProgressTracker,
}

#[async_trait]
impl ProvisioningProgressSink for OrchestratorProgressSink<'_> {
    async fn on_stage(&self, stage: Stage) {
        let mut timestamps = match self.progress.load(self.request_id.as_uuid()).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(request_id = %self.request_id, error = %e, "failed to load provisioning progress, starting fresh");
                Vec::new()
            }
        };
        timestamps.push(StageTimestamp { stage, at: Utc::now() });

        if let Err(e) = self.progress.upsert(self.request_id.as_uuid(), self.tenant_id, stage, &timestamps).await {
            tracing::warn!(request_id = %self.request_id, error = %e, "failed to persist provisioning progress");
        }

        let metadata = EventMetadata { user_id: system_actor(), correlation_id: CorrelationId::new_v4() };
        if let Err(e) = vmforge_kernel::execute::<Vm>(
            self.store,
            self.registry,
            self.tenant_id,
            self.vm_id.as_uuid(),
            VmCommand::ReportProgress { stage },
            metadata,
        )
        .await
        {
            tracing::error!(request_id = %self.request_id, vm_id = %self.vm_id, error = %e, "failed to append provisioning progress event");
        }
    }
}
