//! Caller roles. Admin commands require the `admin` role.

use serde::{Deserialize, Serialize};

/// A role granted to a caller within their tenant.
///
/// Command and query handlers only ever check for one distinction:
/// ordinary requesters versus tenant administrators who may approve,
/// reject, and view the pending queue across projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Can create, view, and cancel their own requests.
    User,
    /// Everything a `User` can do, plus approve/reject any request in
    /// the tenant and view the pending queue across projects.
    Admin,
}
