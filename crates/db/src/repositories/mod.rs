//! Repository layer: one zero-sized struct per table, each taking `&PgPool`.

pub mod category_node_repo;
pub mod category_repo;

pub use category_node_repo::CategoryNodeRepo;
pub use category_repo::{CategoryRepo, SoftDeleteOutcome};
