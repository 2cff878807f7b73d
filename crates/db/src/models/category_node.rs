//! Category node model and the nested tree view built from it.

use std::collections::HashMap;

use catalog_core::tree::{TreeError, TreeNode};
use catalog_core::types::{DbId, SortWeight, Timestamp, ROOT_PARENT_ID};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::node_store::from_db;

/// A row from the `category_nodes` table.
///
/// `sort_weight` is stored as `BIGINT`. A negative stored value is a
/// storage fault and fails the conversion to [`TreeNode`].
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryNode {
    pub id: DbId,
    pub category_id: DbId,
    pub parent_id: DbId,
    pub name: String,
    pub owner_id: Option<DbId>,
    pub owner_name: Option<String>,
    pub required: bool,
    pub selected: bool,
    pub sort_weight: i64,
    pub created_by_id: Option<DbId>,
    pub created_by_name: Option<String>,
    pub updated_by_id: Option<DbId>,
    pub updated_by_name: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CategoryNode {
    pub fn weight(&self) -> Result<SortWeight, TreeError> {
        from_db(self.sort_weight)
    }
}

impl TryFrom<CategoryNode> for TreeNode {
    type Error = TreeError;

    fn try_from(row: CategoryNode) -> Result<Self, TreeError> {
        Ok(TreeNode {
            id: row.id,
            category_id: row.category_id,
            parent_id: row.parent_id,
            sort_weight: row.weight()?,
            name: row.name,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
            required: row.required,
            selected: row.selected,
        })
    }
}

/// DTO for renaming a node.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameCategoryNode {
    pub name: String,
}

/// One node of a nested, weight-ordered tree listing.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTreeView {
    pub id: DbId,
    pub parent_id: DbId,
    pub name: String,
    pub owner_id: Option<DbId>,
    pub owner_name: Option<String>,
    pub required: bool,
    pub selected: bool,
    pub sort_weight: i64,
    pub children: Vec<CategoryTreeView>,
}

impl CategoryTreeView {
    /// Assemble the forest under the root sentinel from flat rows.
    ///
    /// Children keep the order of `rows`, so pass rows sorted by weight.
    /// Rows whose parent is not among `rows` are dropped.
    pub fn build(rows: Vec<CategoryNode>) -> Vec<CategoryTreeView> {
        let mut by_parent: HashMap<DbId, Vec<CategoryNode>> = HashMap::new();
        for row in rows {
            by_parent.entry(row.parent_id).or_default().push(row);
        }
        Self::attach(ROOT_PARENT_ID, &mut by_parent)
    }

    fn attach(
        parent_id: DbId,
        by_parent: &mut HashMap<DbId, Vec<CategoryNode>>,
    ) -> Vec<CategoryTreeView> {
        let Some(rows) = by_parent.remove(&parent_id) else {
            return Vec::new();
        };
        rows.into_iter()
            .map(|row| {
                let children = Self::attach(row.id, by_parent);
                CategoryTreeView {
                    id: row.id,
                    parent_id: row.parent_id,
                    name: row.name,
                    owner_id: row.owner_id,
                    owner_name: row.owner_name,
                    required: row.required,
                    selected: row.selected,
                    sort_weight: row.sort_weight,
                    children,
                }
            })
            .collect()
    }
}
