//! # vmforge-commands: command handlers for the VmRequest lifecycle (C7)
//!
//! Every handler follows the same shape: assert the ambient tenant
//! scope, authorize the actor, execute through [`vmforge_kernel`], and
//! return a version or a taxonomized [`CommandError`] — never an
//! opaque panic or exception across this boundary.

mod error;
mod handlers;
mod quota;

pub use error::CommandError;
pub use handlers::CommandHandlers;
pub use quota::{NoQuota, QuotaError, QuotaPort};
