//! # vmforge-store: the event store (C2)
//!
//! An append-only, per-aggregate versioned, tenant-scoped event log
//! with optimistic concurrency and snapshots. The store never
//! interprets payloads — encoding and decoding go through
//! `vmforge-codec`'s registry — and it never decides whether a command
//! is valid; that's the aggregate runtime's job. Its only
//! responsibilities are durability, ordering, and tenant isolation.

mod error;
mod event_store;
mod schema;

pub use error::StoreError;
pub use event_store::{EventMetadata, PgEventStore, StoredEvent, StoredSnapshot, SNAPSHOT_THRESHOLD};
pub use schema::ensure_schema;
