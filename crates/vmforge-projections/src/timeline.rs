use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres, Transaction};
use uuid::Uuid;
use vmforge_codec::{DomainEvent, VmRequestEvent};
use vmforge_store::StoredEvent;
use vmforge_types::TenantId;

use crate::engine::ProjectionHandler;

/// Appends one human-readable entry to a request's activity timeline.
/// Takes any executor: the projection engine runs this inside the
/// transaction it commits together with the checkpoint advance, while
/// the provisioning orchestrator (which calls this directly for the
/// two outcomes — `VM_READY`/`PROVISIONING_FAILED` — it alone has
/// enough context to describe, since those happen on the `Vm`
/// aggregate rather than `VmRequest`) passes its own pool.
pub async fn append_entry<'e, E>(
    executor: E,
    request_id: Uuid,
    tenant_id: TenantId,
    event_type: &str,
    actor_name: &str,
    details: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO request_timeline (request_id, tenant_id, event_type, actor_name, details, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(request_id)
    .bind(tenant_id.as_uuid())
    .bind(event_type)
    .bind(actor_name)
    .bind(details)
    .bind(occurred_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Subscribes to `VmRequest` events and narrates each lifecycle step
/// into `request_timeline`.
pub struct TimelineProjection;

impl TimelineProjection {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimelineProjection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectionHandler for TimelineProjection {
    fn name(&self) -> &'static str {
        "request_timeline"
    }

    async fn handle(&self, tx: &mut Transaction<'_, Postgres>, stored: &StoredEvent, event: &DomainEvent) -> Result<(), anyhow::Error> {
        let DomainEvent::VmRequest(event) = event else {
            return Ok(());
        };
        let request_id = stored.aggregate_id;
        let tenant_id = stored.tenant_id;

        let (event_type, actor_name, details): (&str, String, String) = match event {
            VmRequestEvent::Created { requester_email, vm_name, .. } => {
                ("CREATED", requester_email.clone(), format!("requested VM {vm_name}"))
            }
            VmRequestEvent::Approved { decided_by, .. } => ("APPROVED", decided_by.to_string(), "request approved".into()),
            VmRequestEvent::Rejected { decided_by, reason, .. } => {
                ("REJECTED", decided_by.to_string(), format!("rejected: {reason}"))
            }
            VmRequestEvent::Cancelled { .. } => ("CANCELLED", "requester".into(), "request cancelled by requester".into()),
            VmRequestEvent::ProvisioningStarted => ("PROVISIONING_STARTED", "system".into(), "provisioning started".into()),
            VmRequestEvent::Ready { .. } | VmRequestEvent::Failed { .. } => return Ok(()),
        };

        append_entry(&mut *tx, request_id, tenant_id, event_type, &actor_name, &details, stored.occurred_at).await?;
        Ok(())
    }
}
