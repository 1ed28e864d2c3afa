use vmforge_types::Version;

/// Errors the event store surfaces. Command handlers translate these
/// into the taxonomized error set the rest of the system shares.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("concurrency conflict: expected version {expected}, actual version {actual}")]
    ConcurrencyConflict { expected: Version, actual: Version },

    #[error("tenant mismatch: this aggregate already belongs to a different tenant")]
    TenantMismatch,

    #[error("unknown event type while encoding or decoding a stored event: {0}")]
    Codec(#[from] vmforge_codec::CodecError),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}
