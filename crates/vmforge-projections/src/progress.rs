use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;
use vmforge_types::{Stage, TenantId};

/// One hypervisor-reported stage transition, timestamped as it
/// arrived. Kept as a JSON array so the row can grow without a
/// migration every time a stage is added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTimestamp {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Live provisioning progress for one request, polled by the UI while
/// a request is in flight. Owned entirely by the provisioning
/// orchestrator, not by the event subscription loop — progress is
/// transient scratch state, not an event-sourced read model.
pub struct ProgressTracker {
    pool: PgPool,
}

impl ProgressTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        request_id: Uuid,
        tenant_id: TenantId,
        stage: Stage,
        stage_timestamps: &[StageTimestamp],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO vm_provisioning_progress
                (request_id, tenant_id, stage, stage_timestamps, estimated_remaining_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (request_id) DO UPDATE SET
                stage = excluded.stage,
                stage_timestamps = excluded.stage_timestamps,
                estimated_remaining_seconds = excluded.estimated_remaining_seconds,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(request_id)
        .bind(tenant_id.as_uuid())
        .bind(stage.as_str())
        .bind(Json(stage_timestamps))
        .bind(stage.estimated_remaining_seconds() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads back the accumulated stage timestamps for a request, so a
    /// new stage can be merged in rather than overwriting history.
    /// Returns an empty list for a request with no progress row yet.
    pub async fn load(&self, request_id: Uuid) -> Result<Vec<StageTimestamp>, sqlx::Error> {
        let row: Option<(Json<Vec<StageTimestamp>>,)> =
            sqlx::query_as("SELECT stage_timestamps FROM vm_provisioning_progress WHERE request_id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map_or_else(Vec::new, |(Json(timestamps),)| timestamps))
    }

    /// Removes the progress row once a request reaches a terminal
    /// outcome (ready or failed). Leaving it behind would make a
    /// finished request look perpetually in-flight to the UI.
    pub async fn delete(&self, request_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM vm_provisioning_progress WHERE request_id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
