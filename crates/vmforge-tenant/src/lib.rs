//! # vmforge-tenant: ambient tenant context
//!
//! Every command handler, query handler, projection handler, and
//! orchestrator callback runs inside a [`TenantScope`]. The scope is
//! carried on a [`tokio::task_local!`] value rather than passed as an
//! explicit parameter everywhere, so it survives arbitrary async
//! suspension inside a single logical operation without every
//! intermediate function having to thread it through.
//!
//! Propagation rule: the scope propagates automatically across every
//! `.await` within the same task. It does **not** survive a bare
//! `tokio::spawn` — spawning onto a new task requires re-entering the
//! scope explicitly via [`TenantScope::scope`]. Losing it silently
//! would be a cross-tenant bug, so [`current`] returns
//! [`TenantError::Missing`] rather than panicking, and the test suite
//! below exercises both halves of the rule.

use serde::{Deserialize, Serialize};
use vmforge_types::{TenantId, UserId};

mod role;
pub use role::Role;

tokio::task_local! {
    static CURRENT: CallerIdentity;
}

/// The verified identity of whoever is driving the current operation.
/// Supplied by the (out-of-scope) identity port — the core never
/// verifies tokens, it only consumes the already-verified result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub roles: Vec<Role>,
}

impl CallerIdentity {
    pub fn new(user_id: UserId, tenant_id: TenantId, email: impl Into<String>, roles: Vec<Role>) -> Self {
        Self { user_id, tenant_id, email: email.into(), roles }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Errors raised when an operation expects an established tenant scope
/// and finds none.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum TenantError {
    /// No [`TenantScope`] is active on the current task. Every command
    /// handler, query handler, projection handler, and orchestrator
    /// callback must establish one before doing any work.
    #[error("no tenant context is established for this operation")]
    Missing,
}

/// An established tenant/caller scope. Construct one with
/// [`TenantScope::for_identity`] and enter it with [`TenantScope::scope`].
#[derive(Debug, Clone)]
pub struct TenantScope {
    identity: CallerIdentity,
}

impl TenantScope {
    pub fn for_identity(identity: CallerIdentity) -> Self {
        Self { identity }
    }

    /// Runs `fut` with this scope established as the ambient tenant
    /// context. Propagates automatically to every `.await` reached from
    /// within `fut`, including ones inside functions that take no tenant
    /// parameter at all.
    pub async fn scope<F: std::future::Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self.identity, fut).await
    }

    pub fn tenant_id(&self) -> TenantId {
        self.identity.tenant_id
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }
}

/// Returns the caller identity established by the innermost
/// [`TenantScope::scope`] call that encloses the current `.await` chain.
///
/// # Errors
///
/// Returns [`TenantError::Missing`] if no scope is active — e.g. the
/// caller spawned a detached task without re-entering a scope on it.
pub fn current() -> Result<CallerIdentity, TenantError> {
    CURRENT.try_with(Clone::clone).map_err(|_| TenantError::Missing)
}

/// Returns just the tenant id of the current scope. Convenience wrapper
/// around [`current`] for the common case of tenant-filtering a query.
pub fn current_tenant_id() -> Result<TenantId, TenantError> {
    current().map(|identity| identity.tenant_id)
}

/// Asserts a tenant scope is established, for handlers that only need
/// to fail fast before doing any other work.
pub fn assert_established() -> Result<(), TenantError> {
    current().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmforge_types::{TenantId, UserId};

    fn identity(tenant: TenantId) -> CallerIdentity {
        CallerIdentity::new(UserId::new_v4(), tenant, "user@example.com", vec![Role::User])
    }

    #[tokio::test]
    async fn current_fails_outside_any_scope() {
        assert_eq!(current().unwrap_err(), TenantError::Missing);
    }

    #[tokio::test]
    async fn scope_establishes_current_for_the_duration_of_the_future() {
        let tenant = TenantId::new_v4();
        let scope = TenantScope::for_identity(identity(tenant));
        scope
            .scope(async {
                assert_eq!(current_tenant_id().unwrap(), tenant);
            })
            .await;
        assert_eq!(current().unwrap_err(), TenantError::Missing);
    }

    #[tokio::test]
    async fn scope_propagates_automatically_across_await_points() {
        let tenant = TenantId::new_v4();
        let scope = TenantScope::for_identity(identity(tenant));
        scope
            .scope(async {
                tokio::task::yield_now().await;
                // Still established after suspending — the
                // propagate-automatically-across-a-suspension half of
                // the rule.
                assert_eq!(current_tenant_id().unwrap(), tenant);
                helper_that_takes_no_tenant_parameter().await;
            })
            .await;
    }

    async fn helper_that_takes_no_tenant_parameter() {
        // No explicit tenant argument was threaded in; the ambient
        // scope is still visible here.
        assert!(current().is_ok());
    }

    #[tokio::test]
    async fn scope_does_not_survive_a_bare_spawn() {
        let tenant = TenantId::new_v4();
        let scope = TenantScope::for_identity(identity(tenant));
        scope
            .scope(async {
                // Spawning detaches onto a new task; without explicitly
                // re-entering the scope there, losing tenant context is
                // detectable rather than silently wrong.
                let handle = tokio::spawn(async { current() });
                let result = handle.await.unwrap();
                assert_eq!(result.unwrap_err(), TenantError::Missing);
            })
            .await;
    }

    #[tokio::test]
    async fn explicit_re_establishment_on_a_spawned_task_restores_it() {
        let tenant = TenantId::new_v4();
        let outer = TenantScope::for_identity(identity(tenant));
        outer
            .scope(async {
                let inner = TenantScope::for_identity(identity(tenant));
                let handle = tokio::spawn(inner.scope(async { current_tenant_id() }));
                assert_eq!(handle.await.unwrap().unwrap(), tenant);
            })
            .await;
    }
}
