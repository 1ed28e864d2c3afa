use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;
use vmforge_types::GlobalSequence;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: i64,
    pub subscriber_name: String,
    pub event_id: Uuid,
    pub global_sequence: i64,
    pub event_type: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Records an event a subscriber gave up on after exhausting retries.
/// The subscriber's cursor still advances past this event; dead letters
/// are reviewed and replayed out of band. Takes any executor so the
/// insert can share a transaction with the checkpoint advance that
/// skips past the poisoned event.
pub async fn record<'e, E>(
    executor: E,
    subscriber_name: &str,
    event_id: Uuid,
    global_sequence: GlobalSequence,
    event_type: &str,
    error: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO projection_dead_letters
            (subscriber_name, event_id, global_sequence, event_type, error, failed_at)
        VALUES ($1, $2, $3, $4, $5, now())
        "#,
    )
    .bind(subscriber_name)
    .bind(event_id)
    .bind(global_sequence.as_i64())
    .bind(event_type)
    .bind(error)
    .execute(executor)
    .await?;
    Ok(())
}

/// Lists dead letters for a subscriber, most recent first.
pub async fn list(pool: &PgPool, subscriber_name: &str, limit: i64) -> Result<Vec<DeadLetter>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, subscriber_name, event_id, global_sequence, event_type, error, failed_at
        FROM projection_dead_letters
        WHERE subscriber_name = $1
        ORDER BY id DESC
        LIMIT $2
        "#,
    )
    .bind(subscriber_name)
    .bind(limit)
    .fetch_all(pool)
    .await
}
