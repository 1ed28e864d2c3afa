use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use vmforge_codec::{CodecRegistry, DomainEvent};
use vmforge_store::{PgEventStore, StoredEvent};
use vmforge_types::GlobalSequence;

use crate::checkpoint::Checkpoint;
use crate::dead_letter;

const BATCH_SIZE: i64 = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const RETRY_BACKOFFS: [Duration; 3] =
    [Duration::from_millis(100), Duration::from_millis(400), Duration::from_millis(1600)];

/// A single read-model subscriber. `name()` doubles as the checkpoint
/// and dead-letter key, so it must be stable across deploys.
#[async_trait]
pub trait ProjectionHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event to the read model, inside `tx`. The engine
    /// commits `tx` together with the checkpoint advance past this
    /// event, so a handler's writes and the cursor move atomically — a
    /// crash mid-batch never re-delivers an event whose write already
    /// landed. Idempotent regardless: a handler may still see the same
    /// event more than once (at-least-once delivery) and must upsert
    /// rather than assume a fresh insert.
    async fn handle(&self, tx: &mut Transaction<'_, Postgres>, stored: &StoredEvent, event: &DomainEvent) -> Result<(), anyhow::Error>;
}

/// Polls the event log from a durable checkpoint and drives a single
/// handler, retrying a failing event with exponential backoff before
/// giving up on it and moving on. A subscriber that can't make
/// progress on one poisoned event would otherwise stall every event
/// behind it forever.
pub struct Subscriber {
    pool: PgPool,
    store: PgEventStore,
    registry: CodecRegistry,
    handler: Box<dyn ProjectionHandler>,
}

impl Subscriber {
    pub fn new(pool: PgPool, store: PgEventStore, registry: CodecRegistry, handler: Box<dyn ProjectionHandler>) -> Self {
        Self { pool, store, registry, handler }
    }

    /// Runs until `cancel` fires, polling for new events and applying
    /// them in order.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), sqlx::Error> {
        let name = self.handler.name();
        let mut cursor = Checkpoint::load(&self.pool, name)
            .await?
            .map_or(GlobalSequence::GENESIS, |c| c.last_global_sequence);

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let batch = self.store.read_from(cursor, BATCH_SIZE).await.map_err(|e| match e {
                vmforge_store::StoreError::Database(e) => e,
                other => sqlx::Error::Protocol(other.to_string()),
            })?;

            if batch.is_empty() {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                continue;
            }

            for stored in &batch {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.process_one(name, stored).await?;
                cursor = stored.global_sequence;
            }
        }
    }

    /// Applies one event and advances the checkpoint past it in a
    /// single transaction, retrying the handler with backoff first.
    /// Each attempt gets its own transaction: a failed attempt's writes
    /// are rolled back rather than left to be retried on top of.
    async fn process_one(&self, name: &'static str, stored: &StoredEvent) -> Result<(), sqlx::Error> {
        let domain_event = match stored.decode(&self.registry) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(subscriber = name, event_id = %stored.event_id, error = %e, "undecodable event, dead-lettering");
                let mut tx = self.pool.begin().await?;
                dead_letter::record(&mut *tx, name, stored.event_id, stored.global_sequence, &stored.event_type, &e.to_string()).await?;
                Checkpoint::save(&mut *tx, name, stored.global_sequence).await?;
                tx.commit().await?;
                return Ok(());
            }
        };

        let mut last_error = None;
        for backoff in std::iter::once(None).chain(RETRY_BACKOFFS.into_iter().map(Some)) {
            if let Some(delay) = backoff {
                tracing::debug!(subscriber = name, event_id = %stored.event_id, ?delay, "retrying projection handler");
                tokio::time::sleep(delay).await;
            }
            let mut tx = self.pool.begin().await?;
            match self.handler.handle(&mut tx, stored, &domain_event).await {
                Ok(()) => {
                    Checkpoint::save(&mut *tx, name, stored.global_sequence).await?;
                    tx.commit().await?;
                    return Ok(());
                }
                Err(e) => {
                    tx.rollback().await?;
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.expect("loop runs at least once");
        let attempts = RETRY_BACKOFFS.len() + 1;
        tracing::error!(
            subscriber = name, event_id = %stored.event_id, attempts, error = %error,
            "projection handler exhausted retries, dead-lettering"
        );
        let mut tx = self.pool.begin().await?;
        dead_letter::record(&mut *tx, name, stored.event_id, stored.global_sequence, &stored.event_type, &error.to_string()).await?;
        Checkpoint::save(&mut *tx, name, stored.global_sequence).await?;
        tx.commit().await?;
        Ok(())
    }
}
