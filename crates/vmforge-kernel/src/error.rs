/// Errors `decide` can produce. These are the aggregate-local subset
/// of the system-wide error taxonomy; command handlers fold them into
/// `CoreError` alongside store and authorization failures.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("command conflicts with current state {current}: {message}")]
    InvalidState { current: String, message: String },
}

/// Wraps a [`DomainError`] with the store-level and retry-exhaustion
/// failures the generic runtime can also produce.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError<E> {
    #[error(transparent)]
    Domain(#[from] E),

    #[error(transparent)]
    Store(#[from] vmforge_store::StoreError),

    #[error("stored snapshot payload could not be decoded: {0}")]
    SnapshotCorrupt(#[source] serde_json::Error),

    #[error("gave up after {attempts} attempts due to repeated concurrency conflicts")]
    RetriesExhausted { attempts: u32 },
}
