use vmforge_commands::{CommandError, QuotaError};
use vmforge_hypervisor::{ConnectionError, ProvisionError, RuntimeQueryError};
use vmforge_notify::NotificationError;
use vmforge_orchestrator::OrchestratorError;
use vmforge_projections::VmwareConfigurationError;
use vmforge_query::QueryError;
use vmforge_tenant::TenantError;

/// Coarse classification a (out-of-scope) HTTP edge maps to a status
/// code. The core never constructs an HTTP response itself — this
/// exists purely so an adapter crate has something to match on instead
/// of pattern-matching every [`CoreError`] variant itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    BadRequest,
    Unauthorized,
    NotFound,
    UnprocessableEntity,
    Conflict,
    BadGateway,
    InternalServerError,
}

/// The single taxonomized error every command and query handler in
/// this workspace ultimately returns, once wiring collapses every
/// layer's local error type into one. Each variant keeps enough
/// context for logging; [`CoreError::status_hint`] is the only thing
/// an HTTP edge needs to decide a response code.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("no tenant context is established for this operation")]
    TenantMissing,
    #[error("validation failed on {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("resource does not exist in the current tenant")]
    NotFound,
    #[error("command conflicts with current state {current}: {message}")]
    InvalidState { current: String, message: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("concurrency conflict: expected version {expected}, actual {actual}")]
    ConcurrencyConflict { expected: vmforge_types::Version, actual: vmforge_types::Version },
    #[error("upstream hypervisor error: {0}")]
    Hypervisor(String),
    #[error("provisioning was cancelled")]
    Cancelled,
    #[error("notification delivery failed: {0}")]
    Notification(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl CoreError {
    /// The status-code family an HTTP edge should use for this error,
    /// per the enumeration-safety rule: resource-scoped `Forbidden`
    /// collapses into `NotFound` so a caller can't distinguish "not
    /// yours" from "doesn't exist" by status code alone. Authorization
    /// failures not tied to a specific resource stay `Forbidden` — this
    /// mapping only applies to the resource-operation path, so an edge
    /// that already separates the two call sites should special-case
    /// its own `Forbidden`s rather than rely on this hint alone.
    pub fn http_status_hint(&self) -> StatusHint {
        match self {
            CoreError::TenantMissing => StatusHint::Unauthorized,
            CoreError::Validation { .. } => StatusHint::BadRequest,
            CoreError::Forbidden(_) => StatusHint::NotFound,
            CoreError::NotFound => StatusHint::NotFound,
            CoreError::InvalidState { .. } => StatusHint::UnprocessableEntity,
            CoreError::Conflict(_) | CoreError::Quota(_) | CoreError::ConcurrencyConflict { .. } => StatusHint::Conflict,
            CoreError::Hypervisor(_) => StatusHint::BadGateway,
            CoreError::Cancelled | CoreError::Notification(_) | CoreError::Persistence(_) => {
                StatusHint::InternalServerError
            }
        }
    }
}

impl From<TenantError> for CoreError {
    fn from(_: TenantError) -> Self {
        CoreError::TenantMissing
    }
}

impl From<CommandError> for CoreError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::TenantMissing(_) => CoreError::TenantMissing,
            CommandError::Forbidden(message) => CoreError::Forbidden(message),
            CommandError::Validation { field, message } => CoreError::Validation { field, message },
            CommandError::InvalidState { current, message } => CoreError::InvalidState { current, message },
            CommandError::NotFound => CoreError::NotFound,
            CommandError::Conflict(message) => CoreError::Conflict(message),
            CommandError::Quota(e) => CoreError::Quota(e),
            CommandError::ConcurrencyConflict { expected, actual } => CoreError::ConcurrencyConflict { expected, actual },
            CommandError::Persistence(message) => CoreError::Persistence(message),
        }
    }
}

impl From<QueryError> for CoreError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::TenantMissing(_) => CoreError::TenantMissing,
            QueryError::Forbidden => CoreError::Forbidden("caller is not permitted to perform this query".into()),
            QueryError::NotFound => CoreError::NotFound,
            QueryError::Database(e) => CoreError::Persistence(e.to_string()),
        }
    }
}

impl From<OrchestratorError> for CoreError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Cancelled => CoreError::Cancelled,
            OrchestratorError::Kernel(message) => CoreError::Persistence(message),
            OrchestratorError::Store(e) => CoreError::Persistence(e.to_string()),
            OrchestratorError::VmwareConfiguration(VmwareConfigurationError::Cipher(e)) => {
                CoreError::Persistence(e.to_string())
            }
            OrchestratorError::VmwareConfiguration(VmwareConfigurationError::Database(e)) => {
                CoreError::Persistence(e.to_string())
            }
        }
    }
}

impl From<ConnectionError> for CoreError {
    fn from(e: ConnectionError) -> Self {
        CoreError::Hypervisor(e.to_string())
    }
}

impl From<ProvisionError> for CoreError {
    fn from(e: ProvisionError) -> Self {
        match e {
            ProvisionError::Cancelled => CoreError::Cancelled,
            other => CoreError::Hypervisor(other.to_string()),
        }
    }
}

impl From<RuntimeQueryError> for CoreError {
    fn from(e: RuntimeQueryError) -> Self {
        match e {
            RuntimeQueryError::NotFound => CoreError::NotFound,
            RuntimeQueryError::ApiError(message) => CoreError::Hypervisor(message),
        }
    }
}

impl From<NotificationError> for CoreError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::TransportUnavailable(message) => CoreError::Notification(message),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Persistence(e.to_string())
    }
}
