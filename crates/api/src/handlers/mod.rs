//! Request handlers.
//!
//! Tree CRUD delegates to the repositories in `catalog_db`; structural node
//! changes go through the ordering engine in [`crate::state::AppState::tree`].
//! Errors are mapped via [`crate::error::AppError`].

pub mod categories;
pub mod category_nodes;
