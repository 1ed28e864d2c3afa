//! # vmforge-projections: event-to-read-model subscribers
//!
//! Each read model here is maintained by a [`engine::ProjectionHandler`]
//! that polls the durable event log from its own checkpoint and
//! upserts into a dedicated table, so handlers never race each other
//! and a slow one never blocks the others. Delivery is at-least-once:
//! handlers must be idempotent, and [`engine::Subscriber`] dead-letters
//! (rather than blocks on) an event a handler can't make progress on
//! after a few retries.

mod checkpoint;
mod dead_letter;
mod engine;
mod progress;
mod schema;
mod timeline;
mod vm_requests;
mod vmware_configuration;

pub use checkpoint::Checkpoint;
pub use dead_letter::{list as list_dead_letters, record as record_dead_letter, DeadLetter};
pub use engine::{ProjectionHandler, Subscriber};
pub use progress::{ProgressTracker, StageTimestamp};
pub use schema::ensure_schema;
pub use timeline::{append_entry as append_timeline_entry, TimelineProjection};
pub use vm_requests::VmRequestsProjection;
pub use vmware_configuration::{VmwareConfiguration, VmwareConfigurationError, VmwareConfigurationStore};
