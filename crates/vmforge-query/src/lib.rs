//! # vmforge-query: read repositories and query handlers (C10, C12)
//!
//! [`ReadRepository`] runs tenant-scoped paged queries over the
//! projections [`vmforge_projections`] maintains; [`QueryHandlers`]
//! adds the authorization layer (admin-only queue, owner-or-admin
//! detail lookup) on top, pulling the caller's identity from
//! `vmforge_tenant`'s ambient scope.

mod error;
mod handlers;
mod repository;

pub use error::QueryError;
pub use handlers::QueryHandlers;
pub use repository::{Page, PageRequest, ProjectSummary, ReadRepository, RequestDetail, RequestSummary, TimelineEntry};
