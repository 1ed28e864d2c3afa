use sqlx::PgPool;

/// Creates the event log and snapshot tables if they don't already
/// exist, and enables row-level security so that tenant scoping is
/// enforced by Postgres itself, not only by the `WHERE tenant_id = $1`
/// clauses every query here already carries. Every session must run
/// `SELECT set_config('app.tenant_id', ..., true)` before querying;
/// [`crate::TenantSession`] does this for every call.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id        UUID PRIMARY KEY,
            aggregate_id    UUID NOT NULL,
            aggregate_type  TEXT NOT NULL,
            tenant_id       UUID NOT NULL,
            version         BIGINT NOT NULL,
            event_type      TEXT NOT NULL,
            payload         BYTEA NOT NULL,
            user_id         UUID NOT NULL,
            correlation_id  UUID NOT NULL,
            occurred_at     TIMESTAMPTZ NOT NULL,
            global_sequence BIGSERIAL NOT NULL,
            UNIQUE (aggregate_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS events_global_sequence_idx ON events (global_sequence)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS events_aggregate_id_idx ON events (aggregate_id, version)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            aggregate_id    UUID PRIMARY KEY,
            aggregate_type  TEXT NOT NULL,
            tenant_id       UUID NOT NULL,
            version         BIGINT NOT NULL,
            payload         BYTEA NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("ALTER TABLE events ENABLE ROW LEVEL SECURITY").execute(pool).await?;
    sqlx::query("ALTER TABLE snapshots ENABLE ROW LEVEL SECURITY").execute(pool).await?;

    // `current_setting(..., true)` is NULL when no session has set it,
    // which the projection engine's cross-tenant `read_from` cursor
    // relies on: command/query handlers always set it, so their rows
    // are filtered; internal subscribers that never set it see
    // everything.
    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE POLICY tenant_isolation ON events
                USING (
                    current_setting('app.tenant_id', true) IS NULL
                    OR tenant_id::text = current_setting('app.tenant_id', true)
                );
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE POLICY tenant_isolation ON snapshots
                USING (
                    current_setting('app.tenant_id', true) IS NULL
                    OR tenant_id::text = current_setting('app.tenant_id', true)
                );
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$;
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
