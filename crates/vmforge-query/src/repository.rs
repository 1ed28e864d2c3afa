use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use uuid::Uuid;
use vmforge_types::{ProjectId, TenantId, UserId, VmRequestId};

/// One clamped, zero-indexed page request. `size` is clamped to
/// `[1, 100]` at construction so a caller can't force an unbounded scan.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size: size.clamp(1, 100) }
    }

    fn limit(self) -> i64 {
        i64::from(self.size)
    }

    fn offset(self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub request_id: VmRequestId,
    pub project_id: ProjectId,
    pub project_name: String,
    pub vm_name: String,
    pub size: String,
    pub requester_email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for RequestSummary {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestSummary {
            request_id: VmRequestId::from_uuid(row.try_get("request_id")?),
            project_id: ProjectId::from_uuid(row.try_get("project_id")?),
            project_name: row.try_get("project_name")?,
            vm_name: row.try_get("vm_name")?,
            size: row.try_get("size")?,
            requester_email: row.try_get("requester_email")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub event_type: String,
    pub actor_name: String,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for TimelineEntry {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(TimelineEntry {
            event_type: row.try_get("event_type")?,
            actor_name: row.try_get("actor_name")?,
            details: row.try_get("details")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RequestDetail {
    pub request_id: VmRequestId,
    pub project_id: ProjectId,
    pub project_name: String,
    pub requester_id: UserId,
    pub requester_email: String,
    pub vm_name: String,
    pub size: String,
    pub justification: String,
    pub status: String,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub vmware_vm_id: Option<String>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub timeline: Vec<TimelineEntry>,
}

struct RequestDetailRow {
    request_id: Uuid,
    project_id: Uuid,
    project_name: String,
    requester_id: Uuid,
    requester_email: String,
    vm_name: String,
    size: String,
    justification: String,
    status: String,
    decided_by: Option<Uuid>,
    decided_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    vmware_vm_id: Option<String>,
    ip_address: Option<String>,
    hostname: Option<String>,
    created_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for RequestDetailRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestDetailRow {
            request_id: row.try_get("request_id")?,
            project_id: row.try_get("project_id")?,
            project_name: row.try_get("project_name")?,
            requester_id: row.try_get("requester_id")?,
            requester_email: row.try_get("requester_email")?,
            vm_name: row.try_get("vm_name")?,
            size: row.try_get("size")?,
            justification: row.try_get("justification")?,
            status: row.try_get("status")?,
            decided_by: row.try_get("decided_by")?,
            decided_at: row.try_get("decided_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            rejection_reason: row.try_get("rejection_reason")?,
            vmware_vm_id: row.try_get("vmware_vm_id")?,
            ip_address: row.try_get("ip_address")?,
            hostname: row.try_get("hostname")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    pub project_name: String,
}

impl FromRow<'_, PgRow> for ProjectSummary {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProjectSummary {
            project_id: ProjectId::from_uuid(row.try_get("project_id")?),
            project_name: row.try_get("project_name")?,
        })
    }
}

/// Tenant-scoped, paged queries over `vm_requests_projection` and its
/// companion tables. Every method takes `tenant_id` explicitly and
/// filters on it — the row-level security policy on these tables is
/// the backstop, not the only guard.
pub struct ReadRepository {
    pool: PgPool,
}

impl ReadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_my_requests(
        &self,
        tenant_id: TenantId,
        requester_id: UserId,
        page: PageRequest,
    ) -> Result<Page<RequestSummary>, sqlx::Error> {
        let items: Vec<RequestSummary> = sqlx::query_as(
            r#"
            SELECT request_id, project_id, project_name, vm_name, size, requester_email, status, created_at
            FROM vm_requests_projection
            WHERE tenant_id = $1 AND requester_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(requester_id.as_uuid())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vm_requests_projection WHERE tenant_id = $1 AND requester_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(requester_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total, page: page.page, size: page.size })
    }

    pub async fn find_pending_by_tenant(
        &self,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        page: PageRequest,
    ) -> Result<Page<RequestSummary>, sqlx::Error> {
        let items: Vec<RequestSummary> = sqlx::query_as(
            r#"
            SELECT request_id, project_id, project_name, vm_name, size, requester_email, status, created_at
            FROM vm_requests_projection
            WHERE tenant_id = $1 AND status = 'PENDING'
              AND ($2::uuid IS NULL OR project_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(project_id.map(ProjectId::as_uuid))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vm_requests_projection WHERE tenant_id = $1 AND status = 'PENDING' AND ($2::uuid IS NULL OR project_id = $2)",
        )
        .bind(tenant_id.as_uuid())
        .bind(project_id.map(ProjectId::as_uuid))
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total, page: page.page, size: page.size })
    }

    /// Looks up one request's full detail plus its timeline. Returns
    /// `None` both when the request doesn't exist at all and when a
    /// non-admin caller isn't its requester — an enumeration attacker
    /// can't distinguish "not yours" from "doesn't exist".
    pub async fn find_detail(
        &self,
        tenant_id: TenantId,
        request_id: VmRequestId,
        actor_id: UserId,
        is_admin: bool,
    ) -> Result<Option<RequestDetail>, sqlx::Error> {
        let row: Option<RequestDetailRow> = sqlx::query_as(
            r#"
            SELECT request_id, project_id, project_name, requester_id, requester_email, vm_name, size,
                   justification, status, decided_by, decided_at, cancelled_at, rejection_reason,
                   vmware_vm_id, ip_address, hostname, created_at
            FROM vm_requests_projection
            WHERE tenant_id = $1 AND request_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(request_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        if !is_admin && row.requester_id != actor_id.as_uuid() {
            return Ok(None);
        }

        let timeline: Vec<TimelineEntry> = sqlx::query_as(
            r#"
            SELECT event_type, actor_name, details, occurred_at
            FROM request_timeline
            WHERE tenant_id = $1 AND request_id = $2
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(request_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(RequestDetail {
            request_id: VmRequestId::from_uuid(row.request_id),
            project_id: ProjectId::from_uuid(row.project_id),
            project_name: row.project_name,
            requester_id: UserId::from_uuid(row.requester_id),
            requester_email: row.requester_email,
            vm_name: row.vm_name,
            size: row.size,
            justification: row.justification,
            status: row.status,
            decided_by: row.decided_by.map(UserId::from_uuid),
            decided_at: row.decided_at,
            cancelled_at: row.cancelled_at,
            rejection_reason: row.rejection_reason,
            vmware_vm_id: row.vmware_vm_id,
            ip_address: row.ip_address,
            hostname: row.hostname,
            created_at: row.created_at,
            timeline,
        }))
    }

    pub async fn find_distinct_projects(&self, tenant_id: TenantId) -> Result<Vec<ProjectSummary>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT DISTINCT project_id, project_name
            FROM vm_requests_projection
            WHERE tenant_id = $1
            ORDER BY project_name ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
    }
}
