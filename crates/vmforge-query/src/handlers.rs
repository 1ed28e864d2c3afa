use sqlx::PgPool;
use vmforge_projections::{list_dead_letters, DeadLetter};
use vmforge_types::{ProjectId, VmRequestId};

use crate::error::QueryError;
use crate::repository::{Page, PageRequest, ProjectSummary, ReadRepository, RequestDetail, RequestSummary};

/// Thin authorization-aware façade over [`ReadRepository`]. Tenant
/// scope comes from the ambient context (`vmforge_tenant::current`);
/// these handlers only add the role check the repository methods
/// don't know how to make themselves.
pub struct QueryHandlers {
    repository: ReadRepository,
    pool: PgPool,
}

impl QueryHandlers {
    pub fn new(repository: ReadRepository, pool: PgPool) -> Self {
        Self { repository, pool }
    }

    pub async fn my_requests(&self, page: u32, size: u32) -> Result<Page<RequestSummary>, QueryError> {
        let identity = vmforge_tenant::current()?;
        Ok(self
            .repository
            .find_my_requests(identity.tenant_id, identity.user_id, PageRequest::new(page, size))
            .await?)
    }

    pub async fn pending_queue(
        &self,
        project_id: Option<ProjectId>,
        page: u32,
        size: u32,
    ) -> Result<Page<RequestSummary>, QueryError> {
        let identity = vmforge_tenant::current()?;
        if !identity.is_admin() {
            return Err(QueryError::Forbidden);
        }
        Ok(self
            .repository
            .find_pending_by_tenant(identity.tenant_id, project_id, PageRequest::new(page, size))
            .await?)
    }

    pub async fn request_detail(&self, request_id: VmRequestId) -> Result<RequestDetail, QueryError> {
        let identity = vmforge_tenant::current()?;
        self.repository
            .find_detail(identity.tenant_id, request_id, identity.user_id, identity.is_admin())
            .await?
            .ok_or(QueryError::NotFound)
    }

    pub async fn distinct_projects(&self) -> Result<Vec<ProjectSummary>, QueryError> {
        let identity = vmforge_tenant::current()?;
        Ok(self.repository.find_distinct_projects(identity.tenant_id).await?)
    }

    /// Lists events a projection subscriber gave up on. Operator
    /// tooling only — admin-gated the same way the pending queue is.
    pub async fn dead_letters(&self, subscriber_name: &str, limit: i64) -> Result<Vec<DeadLetter>, QueryError> {
        let identity = vmforge_tenant::current()?;
        if !identity.is_admin() {
            return Err(QueryError::Forbidden);
        }
        Ok(list_dead_letters(&self.pool, subscriber_name, limit).await?)
    }
}
