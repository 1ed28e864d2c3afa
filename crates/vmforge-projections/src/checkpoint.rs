use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Executor, FromRow, PgPool, Postgres, Row};
use vmforge_types::GlobalSequence;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub subscriber_name: String,
    pub last_global_sequence: GlobalSequence,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Checkpoint {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Checkpoint {
            subscriber_name: row.try_get("subscriber_name")?,
            last_global_sequence: GlobalSequence::from(row.try_get::<i64, _>("last_global_sequence")?),
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Checkpoint {
    /// Loads a subscriber's checkpoint, or `None` if it has never run.
    pub async fn load(pool: &PgPool, subscriber_name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT subscriber_name, last_global_sequence, updated_at
            FROM projection_checkpoints
            WHERE subscriber_name = $1
            "#,
        )
        .bind(subscriber_name)
        .fetch_optional(pool)
        .await
    }

    /// Upserts the checkpoint, advancing the subscriber's cursor. Takes
    /// any executor so callers can run it inside the same transaction
    /// as the projection write it's advancing past.
    pub async fn save<'e, E>(executor: E, subscriber_name: &str, last_global_sequence: GlobalSequence) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (subscriber_name, last_global_sequence, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (subscriber_name) DO UPDATE SET
                last_global_sequence = excluded.last_global_sequence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(subscriber_name)
        .bind(last_global_sequence.as_i64())
        .execute(executor)
        .await?;
        Ok(())
    }
}
