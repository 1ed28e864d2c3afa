use chrono::{DateTime, Utc};
use vmforge_codec::CodecRegistry;
use vmforge_kernel::{VmRequest, VmRequestCommand};
use vmforge_store::{EventMetadata, PgEventStore};
use vmforge_types::{CorrelationId, ProjectId, Version, VmRequestId, VmSize};

use crate::error::CommandError;
use crate::quota::QuotaPort;

/// Entry points for every `VmRequest` command. Each method asserts the
/// ambient tenant scope, authorizes the actor, and executes through
/// the aggregate runtime — never raising anything but [`CommandError`]
/// across this boundary.
pub struct CommandHandlers {
    store: PgEventStore,
    registry: CodecRegistry,
    quota: Box<dyn QuotaPort>,
}

impl CommandHandlers {
    pub fn new(store: PgEventStore, registry: CodecRegistry, quota: Box<dyn QuotaPort>) -> Self {
        Self { store, registry, quota }
    }

    /// Creates a new request. `request_id` is supplied by the caller as
    /// an idempotency key: resubmitting the exact same `(request_id,
    /// payload)` is a no-op that returns the original result;
    /// resubmitting a different payload under the same id is a
    /// [`CommandError::Conflict`].
    pub async fn create_vm_request(
        &self,
        request_id: VmRequestId,
        project_id: ProjectId,
        project_name: String,
        vm_name: String,
        size: VmSize,
        justification: String,
        correlation_id: CorrelationId,
    ) -> Result<(VmRequestId, Version), CommandError> {
        let identity = vmforge_tenant::current()?;
        self.quota.check_and_reserve(identity.tenant_id, project_id).await?;

        let (existing, version) =
            vmforge_kernel::load::<VmRequest>(&self.store, &self.registry, identity.tenant_id, request_id.as_uuid())
                .await
                .map_err(CommandError::from)?;

        if let Some(core) = &existing.created {
            let same_payload = core.project_id == project_id
                && core.project_name == project_name
                && core.vm_name == vm_name
                && core.size == size
                && core.justification == justification
                && core.requester_id == identity.user_id;
            return if same_payload {
                Ok((request_id, version))
            } else {
                Err(CommandError::Conflict(format!(
                    "request {request_id} was already created with a different payload"
                )))
            };
        }

        let command = VmRequestCommand::Create {
            tenant_id: identity.tenant_id,
            project_id,
            project_name,
            requester_id: identity.user_id,
            requester_email: identity.email.clone(),
            vm_name,
            size,
            justification,
        };
        let metadata = EventMetadata { user_id: identity.user_id, correlation_id };
        let (new_version, _, _) = vmforge_kernel::execute::<VmRequest>(
            &self.store,
            &self.registry,
            identity.tenant_id,
            request_id.as_uuid(),
            command,
            metadata,
        )
        .await?;

        Ok((request_id, new_version))
    }

    pub async fn approve_request(
        &self,
        request_id: VmRequestId,
        decided_at: DateTime<Utc>,
        correlation_id: CorrelationId,
    ) -> Result<Version, CommandError> {
        let identity = vmforge_tenant::current()?;
        if !identity.is_admin() {
            return Err(CommandError::Forbidden("approving a request requires the admin role".into()));
        }
        let command = VmRequestCommand::Approve { actor_id: identity.user_id, decided_at };
        self.execute(request_id, command, identity.user_id, correlation_id).await
    }

    pub async fn reject_request(
        &self,
        request_id: VmRequestId,
        reason: String,
        decided_at: DateTime<Utc>,
        correlation_id: CorrelationId,
    ) -> Result<Version, CommandError> {
        let identity = vmforge_tenant::current()?;
        if !identity.is_admin() {
            return Err(CommandError::Forbidden("rejecting a request requires the admin role".into()));
        }
        let command = VmRequestCommand::Reject { actor_id: identity.user_id, decided_at, reason };
        self.execute(request_id, command, identity.user_id, correlation_id).await
    }

    pub async fn cancel_request(
        &self,
        request_id: VmRequestId,
        cancelled_at: DateTime<Utc>,
        correlation_id: CorrelationId,
    ) -> Result<Version, CommandError> {
        let identity = vmforge_tenant::current()?;
        let command = VmRequestCommand::Cancel { actor_id: identity.user_id, cancelled_at };
        self.execute(request_id, command, identity.user_id, correlation_id).await
    }

    async fn execute(
        &self,
        request_id: VmRequestId,
        command: VmRequestCommand,
        user_id: vmforge_types::UserId,
        correlation_id: CorrelationId,
    ) -> Result<Version, CommandError> {
        let identity = vmforge_tenant::current()?;
        let metadata = EventMetadata { user_id, correlation_id };
        let (new_version, _, _) = vmforge_kernel::execute::<VmRequest>(
            &self.store,
            &self.registry,
            identity.tenant_id,
            request_id.as_uuid(),
            command,
            metadata,
        )
        .await?;
        Ok(new_version)
    }
}
