use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use vmforge_codec::{DomainEvent, VmRequestEvent};
use vmforge_store::StoredEvent;

use crate::engine::ProjectionHandler;

/// Maintains `vm_requests_projection`, the flattened read model behind
/// every request list/detail query. One row per `VmRequest` aggregate,
/// upserted on every event rather than rebuilt from scratch.
pub struct VmRequestsProjection;

impl VmRequestsProjection {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VmRequestsProjection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectionHandler for VmRequestsProjection {
    fn name(&self) -> &'static str {
        "vm_requests_projection"
    }

    async fn handle(&self, tx: &mut Transaction<'_, Postgres>, stored: &StoredEvent, event: &DomainEvent) -> Result<(), anyhow::Error> {
        let DomainEvent::VmRequest(event) = event else {
            return Ok(());
        };
        let request_id = stored.aggregate_id;
        let version = stored.version.as_u64() as i64;

        match event {
            VmRequestEvent::Created {
                tenant_id,
                project_id,
                project_name,
                requester_id,
                requester_email,
                vm_name,
                size,
                justification,
            } => {
                let resources = size.resources();
                sqlx::query(
                    r#"
                    INSERT INTO vm_requests_projection
                        (request_id, tenant_id, project_id, project_name, requester_id, requester_email,
                         vm_name, size, vcpu, ram_gib, disk_gib, justification, status, created_at, version)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'PENDING', $13, $14)
                    ON CONFLICT (request_id) DO NOTHING
                    "#,
                )
                .bind(request_id)
                .bind(tenant_id.as_uuid())
                .bind(project_id.as_uuid())
                .bind(project_name)
                .bind(requester_id.as_uuid())
                .bind(requester_email)
                .bind(vm_name)
                .bind(size.as_str())
                .bind(i32::from(resources.vcpu))
                .bind(i32::from(resources.ram_gib))
                .bind(i32::from(resources.disk_gib))
                .bind(justification)
                .bind(stored.occurred_at)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            }
            VmRequestEvent::Approved { decided_by, decided_at } => {
                sqlx::query(
                    "UPDATE vm_requests_projection SET status = 'APPROVED', decided_by = $2, decided_at = $3, version = $4 WHERE request_id = $1 AND version < $4",
                )
                .bind(request_id)
                .bind(decided_by.as_uuid())
                .bind(decided_at)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            }
            VmRequestEvent::Rejected { decided_by, decided_at, reason } => {
                sqlx::query(
                    "UPDATE vm_requests_projection SET status = 'REJECTED', decided_by = $2, decided_at = $3, rejection_reason = $4, version = $5 WHERE request_id = $1 AND version < $5",
                )
                .bind(request_id)
                .bind(decided_by.as_uuid())
                .bind(decided_at)
                .bind(reason)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            }
            VmRequestEvent::Cancelled { cancelled_at } => {
                sqlx::query(
                    "UPDATE vm_requests_projection SET status = 'CANCELLED', cancelled_at = $2, version = $3 WHERE request_id = $1 AND version < $3",
                )
                .bind(request_id)
                .bind(cancelled_at)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            }
            VmRequestEvent::ProvisioningStarted => {
                sqlx::query("UPDATE vm_requests_projection SET status = 'PROVISIONING', version = $2 WHERE request_id = $1 AND version < $2")
                    .bind(request_id)
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
            }
            VmRequestEvent::Ready { vmware_vm_id, ip_address, hostname } => {
                sqlx::query(
                    "UPDATE vm_requests_projection SET status = 'READY', vmware_vm_id = $2, ip_address = $3, hostname = $4, version = $5 WHERE request_id = $1 AND version < $5",
                )
                .bind(request_id)
                .bind(vmware_vm_id)
                .bind(ip_address)
                .bind(hostname)
                .bind(version)
                .execute(&mut *tx)
                .await?;
            }
            VmRequestEvent::Failed { .. } => {
                sqlx::query("UPDATE vm_requests_projection SET status = 'FAILED', version = $2 WHERE request_id = $1 AND version < $2")
                    .bind(request_id)
                    .bind(version)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        Ok(())
    }
}
