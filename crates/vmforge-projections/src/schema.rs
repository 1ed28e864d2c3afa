use sqlx::PgPool;

/// Creates every read-model and engine-bookkeeping table this crate
/// owns, if they don't already exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vm_requests_projection (
            request_id      UUID PRIMARY KEY,
            tenant_id       UUID NOT NULL,
            project_id      UUID NOT NULL,
            project_name    TEXT NOT NULL,
            requester_id    UUID NOT NULL,
            requester_email TEXT NOT NULL,
            vm_name         TEXT NOT NULL,
            size            TEXT NOT NULL,
            vcpu            INT NOT NULL,
            ram_gib         INT NOT NULL,
            disk_gib        INT NOT NULL,
            justification   TEXT NOT NULL,
            status          TEXT NOT NULL,
            decided_by      UUID,
            decided_at      TIMESTAMPTZ,
            cancelled_at    TIMESTAMPTZ,
            rejection_reason TEXT,
            vmware_vm_id    TEXT,
            ip_address      TEXT,
            hostname        TEXT,
            created_at      TIMESTAMPTZ NOT NULL,
            version         BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS vm_requests_projection_tenant_idx ON vm_requests_projection (tenant_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS vm_requests_projection_requester_idx ON vm_requests_projection (tenant_id, requester_id, created_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_timeline (
            id          BIGSERIAL PRIMARY KEY,
            request_id  UUID NOT NULL,
            tenant_id   UUID NOT NULL,
            event_type  TEXT NOT NULL,
            actor_name  TEXT NOT NULL,
            details     TEXT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS request_timeline_request_idx ON request_timeline (request_id, occurred_at ASC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vm_provisioning_progress (
            request_id                UUID PRIMARY KEY,
            tenant_id                 UUID NOT NULL,
            stage                     TEXT NOT NULL,
            stage_timestamps          JSONB NOT NULL,
            estimated_remaining_seconds BIGINT NOT NULL,
            updated_at                TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vmware_configuration (
            tenant_id       UUID PRIMARY KEY,
            vcenter_url     TEXT NOT NULL,
            cluster         TEXT NOT NULL,
            datastore       TEXT NOT NULL,
            network         TEXT NOT NULL,
            template        TEXT NOT NULL,
            encrypted_password BYTEA NOT NULL,
            verified_at     TIMESTAMPTZ,
            version         BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projection_checkpoints (
            subscriber_name  TEXT PRIMARY KEY,
            last_global_sequence BIGINT NOT NULL,
            updated_at       TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projection_dead_letters (
            id              BIGSERIAL PRIMARY KEY,
            subscriber_name TEXT NOT NULL,
            event_id        UUID NOT NULL,
            global_sequence BIGINT NOT NULL,
            event_type      TEXT NOT NULL,
            error           TEXT NOT NULL,
            failed_at       TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
