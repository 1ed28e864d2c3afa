use vmforge_kernel::{DomainError, RuntimeError};
use vmforge_types::Version;

use crate::quota::QuotaError;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no tenant context is established for this operation")]
    TenantMissing(#[from] vmforge_tenant::TenantError),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed on {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("invalid state ({current}): {message}")]
    InvalidState { current: String, message: String },
    #[error("resource does not exist in the current tenant")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("concurrency conflict: expected version {expected}, actual {actual}")]
    ConcurrencyConflict { expected: Version, actual: Version },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<RuntimeError<DomainError>> for CommandError {
    fn from(e: RuntimeError<DomainError>) -> Self {
        match e {
            RuntimeError::Domain(DomainError::Validation { field, message }) => CommandError::Validation { field, message },
            RuntimeError::Domain(DomainError::Forbidden(message)) => CommandError::Forbidden(message),
            RuntimeError::Domain(DomainError::InvalidState { current, message }) => {
                CommandError::InvalidState { current, message }
            }
            RuntimeError::Store(vmforge_store::StoreError::ConcurrencyConflict { expected, actual }) => {
                CommandError::ConcurrencyConflict { expected, actual }
            }
            RuntimeError::Store(vmforge_store::StoreError::TenantMismatch) => CommandError::NotFound,
            RuntimeError::Store(other) => CommandError::Persistence(other.to_string()),
            RuntimeError::SnapshotCorrupt(err) => CommandError::Persistence(err.to_string()),
            RuntimeError::RetriesExhausted { attempts } => {
                CommandError::Persistence(format!("gave up after {attempts} concurrency retries"))
            }
        }
    }
}
