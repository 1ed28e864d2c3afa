//! # vmforge-codec: event type registry
//!
//! Maps each `event_type` string to its structured payload shape.
//! Registration happens once, in [`CodecRegistry::new`]; after that the
//! registry is read-only and shareable across every command handler
//! and projection subscriber.

mod events;
mod registry;

pub use events::{DomainEvent, VmEvent, VmRequestEvent};
pub use registry::{CodecError, CodecRegistry};
