#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no tenant context is established for this operation")]
    TenantMissing(#[from] vmforge_tenant::TenantError),
    #[error("caller is not permitted to perform this query")]
    Forbidden,
    #[error("requested resource does not exist in the current tenant")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
