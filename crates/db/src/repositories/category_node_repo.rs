//! Read and rename access to `category_nodes`.
//!
//! Structural writes (create, move, delete, rebalance) go through the
//! ordering engine via [`crate::node_store::PgNodeStore`].

use catalog_core::tree::Actor;
use catalog_core::types::DbId;
use sqlx::PgPool;

use crate::models::category_node::CategoryNode;

/// Column list for category_nodes queries.
pub(crate) const COLUMNS: &str = "id, category_id, parent_id, name, owner_id, owner_name, \
    required, selected, sort_weight, created_by_id, created_by_name, updated_by_id, \
    updated_by_name, created_at, updated_at";

pub struct CategoryNodeRepo;

impl CategoryNodeRepo {
    /// Find a node by ID within its tree.
    pub async fn find_by_id(
        pool: &PgPool,
        category_id: DbId,
        id: DbId,
    ) -> Result<Option<CategoryNode>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM category_nodes WHERE category_id = $1 AND id = $2");
        sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Children of `parent_id`, in display order (ascending weight).
    pub async fn list_children(
        pool: &PgPool,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Vec<CategoryNode>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM category_nodes
             WHERE category_id = $1 AND parent_id = $2
             ORDER BY sort_weight ASC"
        );
        sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    /// Every node of a tree, grouped by parent and ordered by weight.
    pub async fn list_by_category(
        pool: &PgPool,
        category_id: DbId,
    ) -> Result<Vec<CategoryNode>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM category_nodes
             WHERE category_id = $1
             ORDER BY parent_id ASC, sort_weight ASC"
        );
        sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .fetch_all(pool)
            .await
    }

    /// Rename a node. A sibling holding the same name fails on
    /// `uq_category_nodes_name`.
    pub async fn rename(
        pool: &PgPool,
        category_id: DbId,
        id: DbId,
        name: &str,
        actor: &Actor,
    ) -> Result<Option<CategoryNode>, sqlx::Error> {
        let query = format!(
            "UPDATE category_nodes SET name = $3, updated_by_id = $4, updated_by_name = $5
             WHERE category_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .bind(id)
            .bind(name)
            .bind(actor.id)
            .bind(&actor.name)
            .fetch_optional(pool)
            .await
    }
}
