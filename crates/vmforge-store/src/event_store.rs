use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use vmforge_codec::{CodecRegistry, DomainEvent};
use vmforge_types::{CorrelationId, GlobalSequence, TenantId, UserId, Version};

use crate::StoreError;

/// Context carried alongside every event at append time. Not part of
/// the event's own payload (the codec owns that); this is what the
/// store needs to populate the log's fixed columns.
#[derive(Debug, Clone)]
pub struct EventMetadata {
    pub user_id: UserId,
    pub correlation_id: CorrelationId,
}

/// One row of the durable log, as loaded back for replay.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: TenantId,
    pub version: Version,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub user_id: UserId,
    pub correlation_id: CorrelationId,
    pub occurred_at: DateTime<Utc>,
    pub global_sequence: GlobalSequence,
}

impl StoredEvent {
    /// Decodes this row's payload through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if `event_type` is unregistered or
    /// the payload doesn't match its expected shape.
    pub fn decode(&self, registry: &CodecRegistry) -> Result<DomainEvent, StoreError> {
        Ok(registry.decode(&self.event_type, &self.payload)?)
    }
}

/// A snapshot of an aggregate's state at a given version.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub aggregate_id: Uuid,
    pub tenant_id: TenantId,
    pub version: Version,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Number of events since the last snapshot after which a fresh
/// snapshot is worth taking. A performance optimization, not a
/// correctness requirement.
pub const SNAPSHOT_THRESHOLD: u64 = 100;

/// Postgres-backed event store (C2). Tenant scoping is enforced both
/// here (explicit `WHERE tenant_id = $1` predicates) and at the
/// database layer via the row-level security policies
/// [`crate::schema::ensure_schema`] installs.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    registry: CodecRegistry,
}

impl PgEventStore {
    pub fn new(pool: PgPool, registry: CodecRegistry) -> Self {
        Self { pool, registry }
    }

    async fn set_tenant_session(tx: &mut sqlx::PgConnection, tenant_id: TenantId) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.as_uuid().to_string())
            .execute(tx)
            .await?;
        Ok(())
    }

    /// Appends `events` to `aggregate_id`, atomically and subject to
    /// optimistic concurrency on `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] if another append
    /// has advanced the aggregate past `expected_version`, or
    /// [`StoreError::TenantMismatch`] if the aggregate already belongs
    /// to a different tenant.
    pub async fn append(
        &self,
        tenant_id: TenantId,
        aggregate_id: Uuid,
        aggregate_type: &'static str,
        expected_version: Version,
        events: &[DomainEvent],
        metadata: EventMetadata,
    ) -> Result<Version, StoreError> {
        if events.is_empty() {
            return Ok(expected_version);
        }

        let mut tx = self.pool.begin().await?;
        Self::set_tenant_session(&mut *tx, tenant_id).await?;

        // Serializes concurrent appends to the same aggregate within
        // this transaction's lifetime, so the version check below
        // can't race with another append between the read and the
        // insert.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(aggregate_id.to_string())
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query(
            "SELECT tenant_id, version FROM events WHERE aggregate_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(aggregate_id)
        .fetch_optional(&mut *tx)
        .await?;

        let actual_version = match &existing {
            Some(row) => {
                let existing_tenant: Uuid = row.try_get("tenant_id")?;
                if existing_tenant != tenant_id.as_uuid() {
                    return Err(StoreError::TenantMismatch);
                }
                Version::new(row.try_get::<i64, _>("version")? as u64)
            }
            None => Version::ZERO,
        };

        if actual_version != expected_version {
            return Err(StoreError::ConcurrencyConflict { expected: expected_version, actual: actual_version });
        }

        let occurred_at = Utc::now();
        let mut next_version = expected_version;
        for event in events {
            next_version = next_version.next();
            let (event_type, payload) = self.registry.encode(event)?;
            sqlx::query(
                r#"
                INSERT INTO events
                    (event_id, aggregate_id, aggregate_type, tenant_id, version,
                     event_type, payload, user_id, correlation_id, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(aggregate_id)
            .bind(aggregate_type)
            .bind(tenant_id.as_uuid())
            .bind(next_version.as_u64() as i64)
            .bind(event_type)
            .bind(payload)
            .bind(metadata.user_id.as_uuid())
            .bind(metadata.correlation_id.as_uuid())
            .bind(occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(next_version)
    }

    /// Loads every event for `aggregate_id`, ordered by version
    /// ascending, filtered to `tenant_id`. An aggregate that belongs to
    /// a different tenant loads as empty — from the caller's
    /// perspective, indistinguishable from not existing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a connection or query
    /// failure.
    pub async fn load(&self, tenant_id: TenantId, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::set_tenant_session(&mut *conn, tenant_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, tenant_id, version,
                   event_type, payload, user_id, correlation_id, occurred_at, global_sequence
            FROM events
            WHERE aggregate_id = $1 AND tenant_id = $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(row_to_stored_event).collect()
    }

    /// Returns the latest snapshot for `aggregate_id` (if any) plus the
    /// events appended after it, both tenant-filtered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a connection or query
    /// failure.
    pub async fn load_from_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: Uuid,
    ) -> Result<(Option<StoredSnapshot>, Vec<StoredEvent>), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::set_tenant_session(&mut *conn, tenant_id).await?;

        let snapshot_row = sqlx::query(
            "SELECT aggregate_id, tenant_id, version, payload, created_at FROM snapshots WHERE aggregate_id = $1 AND tenant_id = $2",
        )
        .bind(aggregate_id)
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        let snapshot = snapshot_row.map(row_to_stored_snapshot).transpose()?;
        let from_version = snapshot.as_ref().map_or(0i64, |s| s.version.as_u64() as i64);

        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, tenant_id, version,
                   event_type, payload, user_id, correlation_id, occurred_at, global_sequence
            FROM events
            WHERE aggregate_id = $1 AND tenant_id = $2 AND version > $3
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(tenant_id.as_uuid())
        .bind(from_version)
        .fetch_all(&mut *conn)
        .await?;

        let events = rows.into_iter().map(row_to_stored_event).collect::<Result<_, _>>()?;
        Ok((snapshot, events))
    }

    /// Idempotently replaces (or inserts) the snapshot for
    /// `aggregate_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a connection or query
    /// failure.
    pub async fn save_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: Uuid,
        aggregate_type: &'static str,
        version: Version,
        payload: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::set_tenant_session(&mut *conn, tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, tenant_id, version, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                created_at = excluded.created_at
            "#,
        )
        .bind(aggregate_id)
        .bind(aggregate_type)
        .bind(tenant_id.as_uuid())
        .bind(version.as_u64() as i64)
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Whether `version` is far enough past `last_snapshot_version` to
    /// warrant a fresh snapshot.
    pub fn should_snapshot(last_snapshot_version: Version, version: Version) -> bool {
        version.as_u64() - last_snapshot_version.as_u64() > SNAPSHOT_THRESHOLD
    }

    /// Reads up to `batch_size` events in ascending global order,
    /// starting strictly after `cursor`. This is the projection
    /// subscription primitive — deliberately cross-tenant, since a
    /// subscriber's job is to fan events back out into per-tenant
    /// read models.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a connection or query
    /// failure.
    pub async fn read_from(
        &self,
        cursor: GlobalSequence,
        batch_size: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, tenant_id, version,
                   event_type, payload, user_id, correlation_id, occurred_at, global_sequence
            FROM events
            WHERE global_sequence > $1
            ORDER BY global_sequence ASC
            LIMIT $2
            "#,
        )
        .bind(cursor.as_i64())
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_stored_event).collect()
    }
}

fn row_to_stored_event(row: sqlx::postgres::PgRow) -> Result<StoredEvent, StoreError> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        version: Version::new(row.try_get::<i64, _>("version")? as u64),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        correlation_id: CorrelationId::from_uuid(row.try_get("correlation_id")?),
        occurred_at: row.try_get("occurred_at")?,
        global_sequence: GlobalSequence::new(row.try_get("global_sequence")?),
    })
}

fn row_to_stored_snapshot(row: sqlx::postgres::PgRow) -> Result<StoredSnapshot, StoreError> {
    Ok(StoredSnapshot {
        aggregate_id: row.try_get("aggregate_id")?,
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        version: Version::new(row.try_get::<i64, _>("version")? as u64),
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}
