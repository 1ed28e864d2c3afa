use async_trait::async_trait;
use vmforge_types::{ProjectId, TenantId};

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("quota exceeded: {0}")]
    Exceeded(String),
}

/// Policy hook a deployment can wire in to cap how many VMs a project
/// or tenant may request concurrently. Nothing in the event-sourced
/// core depends on quotas existing; this is a gate command handlers
/// consult before creating a request.
#[async_trait]
pub trait QuotaPort: Send + Sync {
    async fn check_and_reserve(&self, tenant_id: TenantId, project_id: ProjectId) -> Result<(), QuotaError>;
}

/// The default: no quota enforcement. Every reservation succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuota;

#[async_trait]
impl QuotaPort for NoQuota {
    async fn check_and_reserve(&self, _tenant_id: TenantId, _project_id: ProjectId) -> Result<(), QuotaError> {
        Ok(())
    }
}
