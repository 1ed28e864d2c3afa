//! # vmforge: wiring and the unified error taxonomy
//!
//! Assembles every other crate in the workspace into one running
//! instance ([`bootstrap::Application`]) and collapses each layer's
//! local error type into [`CoreError`], the single taxonomy an
//! (out-of-scope) HTTP edge would translate into responses.

mod bootstrap;
mod error;

pub use bootstrap::Application;
pub use error::{CoreError, StatusHint};
