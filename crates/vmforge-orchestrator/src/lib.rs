//! # vmforge-orchestrator: provisioning driver (C9)
//!
//! Reacts to an approved request by driving [`vmforge_hypervisor::HypervisorPort`]
//! through a full clone, merging progress into a read model as it
//! goes, and reconciling both the `Vm` and `VmRequest` aggregates on
//! success or failure. Runs as a [`vmforge_projections::ProjectionHandler`]
//! subscriber, so it shares the same durable-checkpoint, at-least-once
//! delivery guarantees every other read model gets.

mod error;
mod naming;
mod orchestrator;
mod progress_sink;

pub use error::OrchestratorError;
pub use naming::{derive_vm_id, effective_vm_name, project_prefix};
pub use orchestrator::{ProvisioningOrchestrator, DEFAULT_STALL_THRESHOLD};
pub use progress_sink::{system_actor, OrchestratorProgressSink};
