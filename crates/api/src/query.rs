//! Shared query parameter types for API handlers.

use catalog_core::types::{DbId, ROOT_PARENT_ID};
use serde::Deserialize;

/// `?parent_id=` selecting one sibling set; absent means the tree's top level.
#[derive(Debug, Deserialize)]
pub struct ParentParams {
    #[serde(default = "root_parent")]
    pub parent_id: DbId,
}

fn root_parent() -> DbId {
    ROOT_PARENT_ID
}
