//! The aggregate runtime (C4): the generic load/replay/append
//! lifecycle shared by every aggregate. An aggregate only supplies
//! `apply` and `decide`; everything about persistence, retries, and
//! snapshot bookkeeping lives here, once.

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use vmforge_codec::{CodecRegistry, DomainEvent};
use vmforge_store::{EventMetadata, PgEventStore, StoreError};
use vmforge_types::{TenantId, Version};

use crate::error::RuntimeError;

/// How many times `execute` retries a command after a concurrency
/// conflict before surfacing the failure.
pub const MAX_RETRIES: u32 = 3;

/// The shape every aggregate implements. `decide` and `apply` are pure
/// — no IO, no clocks, no randomness — so replay is deterministic and
/// the same event sequence always produces the same state.
pub trait Aggregate: Default + Clone + Serialize + DeserializeOwned + Send + Sync {
    type Command: Clone + Send;
    type Event: Clone + Send + Into<DomainEvent>;
    type Error: Send;

    /// The `aggregate_type` discriminator stored alongside every event
    /// for this aggregate.
    const AGGREGATE_TYPE: &'static str;

    /// The state with zero events applied.
    fn empty() -> Self {
        Self::default()
    }

    /// Folds one event into the current state. Pure; used identically
    /// during replay and immediately after a successful `decide`.
    fn apply(self, event: &Self::Event) -> Self;

    /// Validates `command` against the current state and produces the
    /// events it should emit, or rejects it.
    fn decide(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Narrows a decoded [`DomainEvent`] to this aggregate's event
    /// type. Returns `None` for events belonging to the other
    /// aggregate kind, which `load` treats as a bug (an aggregate's
    /// stream must contain only its own events) rather than silently
    /// skipping them.
    fn narrow(event: DomainEvent) -> Option<Self::Event>;
}

/// Loads `aggregate_id` by replaying its snapshot (if any) plus every
/// event after it, up to the current tenant's events only.
///
/// # Errors
///
/// Returns [`RuntimeError::Store`] on a storage failure, or
/// [`RuntimeError::SnapshotCorrupt`] if a stored snapshot doesn't
/// deserialize into `A`.
pub async fn load<A: Aggregate>(
    store: &PgEventStore,
    registry: &CodecRegistry,
    tenant_id: TenantId,
    aggregate_id: Uuid,
) -> Result<(A, Version), RuntimeError<A::Error>> {
    let (snapshot, events_after) = store.load_from_snapshot(tenant_id, aggregate_id).await?;

    let (mut state, mut version) = match snapshot {
        Some(s) => {
            let state: A = serde_json::from_slice(&s.payload).map_err(RuntimeError::SnapshotCorrupt)?;
            (state, s.version)
        }
        None => (A::empty(), Version::ZERO),
    };

    for stored in events_after {
        let domain_event = stored.decode(registry)?;
        let Some(event) = A::narrow(domain_event) else {
            tracing::error!(
                aggregate_id = %aggregate_id,
                event_type = %stored.event_type,
                "event in this aggregate's stream does not belong to its event type"
            );
            continue;
        };
        state = state.apply(&event);
        version = stored.version;
    }

    Ok((state, version))
}

/// Loads, decides, and appends in one step, retrying on
/// [`StoreError::ConcurrencyConflict`] up to [`MAX_RETRIES`] times with
/// a fresh load each attempt.
///
/// # Errors
///
/// Returns [`RuntimeError::Domain`] if `decide` rejects the command,
/// [`RuntimeError::RetriesExhausted`] if every retry still raced
/// another writer, or [`RuntimeError::Store`]/[`RuntimeError::SnapshotCorrupt`]
/// on a lower-level failure.
pub async fn execute<A: Aggregate>(
    store: &PgEventStore,
    registry: &CodecRegistry,
    tenant_id: TenantId,
    aggregate_id: Uuid,
    command: A::Command,
    metadata: EventMetadata,
) -> Result<(Version, A, Vec<A::Event>), RuntimeError<A::Error>> {
    let mut last_conflict = None;

    for attempt in 0..MAX_RETRIES {
        let (state, version) = load::<A>(store, registry, tenant_id, aggregate_id).await?;
        let events = state.decide(command.clone()).map_err(RuntimeError::Domain)?;

        if events.is_empty() {
            return Ok((version, state, events));
        }

        let domain_events: Vec<DomainEvent> = events.iter().cloned().map(Into::into).collect();
        match store
            .append(tenant_id, aggregate_id, A::AGGREGATE_TYPE, version, &domain_events, metadata.clone())
            .await
        {
            Ok(new_version) => {
                let mut next_state = state;
                for event in &events {
                    next_state = next_state.apply(event);
                }
                return Ok((new_version, next_state, events));
            }
            Err(conflict @ StoreError::ConcurrencyConflict { .. }) => {
                tracing::debug!(aggregate_id = %aggregate_id, attempt, "concurrency conflict, retrying");
                last_conflict = Some(conflict);
            }
            Err(other) => return Err(RuntimeError::Store(other)),
        }
    }

    match last_conflict {
        Some(conflict) => Err(RuntimeError::Store(conflict)),
        None => Err(RuntimeError::RetriesExhausted { attempts: MAX_RETRIES }),
    }
}
