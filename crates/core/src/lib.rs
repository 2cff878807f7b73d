//! Domain layer for the data-catalog category service.
//!
//! Holds the shared id/timestamp types, the generic [`error::CoreError`],
//! name validation for trees and nodes, and the [`tree`] ordering engine
//! that maintains sibling order, depth limits, and acyclicity for
//! category trees stored as flat rows.

pub mod category;
pub mod error;
pub mod memory;
pub mod tree;
pub mod types;
