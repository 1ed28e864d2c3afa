//! # vmforge-kernel: aggregate runtime and state machines (C4, C5, C6)
//!
//! The pure, deterministic heart of the system: `decide` validates a
//! command against current state and produces events; `apply` folds an
//! event into state. Neither touches IO, clocks, or randomness, so
//! replaying the same event sequence always yields the same state.
//! [`runtime::execute`] is the only place that talks to the store.

mod error;
mod runtime;
mod vm;
mod vm_request;

pub use error::{DomainError, RuntimeError};
pub use runtime::{execute, load, Aggregate, MAX_RETRIES};
pub use vm::{Vm, VmCommand, VmCore, VmStatus};
pub use vm_request::{VmRequest, VmRequestCommand, VmRequestCore, VmRequestStatus};
