#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("provisioning was cancelled")]
    Cancelled,
    #[error("aggregate runtime failure: {0}")]
    Kernel(String),
    #[error("projection store failure: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    VmwareConfiguration(#[from] vmforge_projections::VmwareConfigurationError),
}
