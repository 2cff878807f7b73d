//! PostgreSQL implementation of the ordering engine's store seam.
//!
//! Every engine attempt runs in one `sqlx` transaction. Writes that can hit
//! a sibling unique constraint run inside a savepoint: PostgreSQL aborts the
//! whole transaction on a failed statement, and the rebalance pass needs to
//! defer a colliding row and keep going.

use async_trait::async_trait;
use catalog_core::tree::{Actor, NewNode, NodeStore, NodeTx, SiblingKey, TreeError, TreeNode};
use catalog_core::types::{DbId, SortWeight};
use sqlx::{Connection, PgPool, Postgres, Transaction};

use crate::models::category_node::CategoryNode;
use crate::repositories::category_node_repo::COLUMNS;

/// Unique constraint guarding sibling weights.
pub const UQ_SORT_WEIGHT: &str = "uq_category_nodes_sort_weight";

/// Unique constraint guarding sibling names.
pub const UQ_NAME: &str = "uq_category_nodes_name";

/// Opens engine transactions on a connection pool.
#[derive(Debug, Clone)]
pub struct PgNodeStore {
    pool: PgPool,
}

impl PgNodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NodeStore for PgNodeStore {
    type Tx = PgNodeTx;

    async fn begin(&self) -> Result<PgNodeTx, TreeError> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(PgNodeTx { tx })
    }
}

/// One open engine transaction.
pub struct PgNodeTx {
    tx: Transaction<'static, Postgres>,
}

/// Map a database error onto the engine's error kinds.
///
/// Weight collisions, serialization failures, and deadlocks are retryable
/// conflicts; name collisions are reported as such. Everything else is a
/// storage failure.
pub fn classify(err: sqlx::Error) -> TreeError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") if db_err.constraint() == Some(UQ_SORT_WEIGHT) => {
                return TreeError::Conflict {
                    detail: db_err.message().to_string(),
                };
            }
            Some("23505") if db_err.constraint() == Some(UQ_NAME) => {
                return TreeError::NameConflict {
                    name: String::new(),
                };
            }
            Some("40001") | Some("40P01") => {
                return TreeError::Conflict {
                    detail: db_err.message().to_string(),
                };
            }
            _ => {}
        }
    }
    TreeError::storage(err)
}

/// Attach the offending name to a bare name conflict.
fn with_name(err: TreeError, name: &str) -> TreeError {
    match err {
        TreeError::NameConflict { .. } => TreeError::NameConflict {
            name: name.to_string(),
        },
        other => other,
    }
}

fn to_db(weight: SortWeight) -> Result<i64, TreeError> {
    i64::try_from(weight)
        .map_err(|_| TreeError::Internal(format!("Sort weight {weight} does not fit in BIGINT")))
}

pub(crate) fn from_db(weight: i64) -> Result<SortWeight, TreeError> {
    SortWeight::try_from(weight)
        .map_err(|_| TreeError::Internal(format!("Stored sort weight {weight} is negative")))
}

fn key((id, weight): (DbId, i64)) -> Result<SiblingKey, TreeError> {
    Ok(SiblingKey {
        id,
        sort_weight: from_db(weight)?,
    })
}

impl PgNodeTx {
    async fn sibling_edge(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
        order: &str,
    ) -> Result<Option<SiblingKey>, TreeError> {
        let query = format!(
            "SELECT id, sort_weight FROM category_nodes
             WHERE category_id = $1 AND parent_id = $2
             ORDER BY sort_weight {order} LIMIT 1"
        );
        let row: Option<(DbId, i64)> = sqlx::query_as(&query)
            .bind(category_id)
            .bind(parent_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.map(key).transpose()
    }

    async fn node_name(&mut self, category_id: DbId, node_id: DbId) -> Result<String, TreeError> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM category_nodes WHERE category_id = $1 AND id = $2")
                .bind(category_id)
                .bind(node_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(classify)?;
        Ok(name.unwrap_or_default())
    }
}

#[async_trait]
impl NodeTx for PgNodeTx {
    async fn category_exists(&mut self, category_id: DbId) -> Result<bool, TreeError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(category_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn find_node(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<TreeNode>, TreeError> {
        let query =
            format!("SELECT {COLUMNS} FROM category_nodes WHERE category_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .bind(node_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.map(TreeNode::try_from).transpose()
    }

    async fn min_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError> {
        self.sibling_edge(category_id, parent_id, "ASC").await
    }

    async fn max_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError> {
        self.sibling_edge(category_id, parent_id, "DESC").await
    }

    async fn sibling_below(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
        weight: SortWeight,
    ) -> Result<Option<SiblingKey>, TreeError> {
        let row: Option<(DbId, i64)> = sqlx::query_as(
            "SELECT id, sort_weight FROM category_nodes
             WHERE category_id = $1 AND parent_id = $2 AND sort_weight < $3
             ORDER BY sort_weight DESC LIMIT 1",
        )
        .bind(category_id)
        .bind(parent_id)
        .bind(to_db(weight)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;
        row.map(key).transpose()
    }

    async fn siblings_ordered_asc_locked(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Vec<SiblingKey>, TreeError> {
        let rows: Vec<(DbId, i64)> = sqlx::query_as(
            "SELECT id, sort_weight FROM category_nodes
             WHERE category_id = $1 AND parent_id = $2
             ORDER BY sort_weight ASC
             FOR UPDATE",
        )
        .bind(category_id)
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.into_iter().map(key).collect()
    }

    async fn parent_of(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, TreeError> {
        sqlx::query_scalar("SELECT parent_id FROM category_nodes WHERE category_id = $1 AND id = $2")
            .bind(category_id)
            .bind(node_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)
    }

    async fn lock_parent_of(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, TreeError> {
        // Under READ COMMITTED a row-locking read waits for any writer of the
        // row and then sees its committed parent.
        sqlx::query_scalar(
            "SELECT parent_id FROM category_nodes WHERE category_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(category_id)
        .bind(node_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn child_ids(
        &mut self,
        category_id: DbId,
        parent_ids: &[DbId],
    ) -> Result<Vec<DbId>, TreeError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar(
            "SELECT id FROM category_nodes WHERE category_id = $1 AND parent_id = ANY($2)",
        )
        .bind(category_id)
        .bind(parent_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn insert(
        &mut self,
        category_id: DbId,
        node: &NewNode,
        sort_weight: SortWeight,
        actor: &Actor,
    ) -> Result<TreeNode, TreeError> {
        let query = format!(
            "INSERT INTO category_nodes
                (category_id, parent_id, name, owner_id, owner_name, required, selected,
                 sort_weight, created_by_id, created_by_name, updated_by_id, updated_by_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $9, $10)
             RETURNING {COLUMNS}"
        );
        let mut savepoint = self.tx.begin().await.map_err(classify)?;
        let result = sqlx::query_as::<_, CategoryNode>(&query)
            .bind(category_id)
            .bind(node.parent_id)
            .bind(&node.name)
            .bind(node.owner_id)
            .bind(&node.owner_name)
            .bind(node.required)
            .bind(node.selected)
            .bind(to_db(sort_weight)?)
            .bind(actor.id)
            .bind(&actor.name)
            .fetch_one(&mut *savepoint)
            .await;
        match result {
            Ok(row) => {
                savepoint.commit().await.map_err(classify)?;
                TreeNode::try_from(row)
            }
            Err(err) => {
                savepoint.rollback().await.map_err(classify)?;
                Err(with_name(classify(err), &node.name))
            }
        }
    }

    async fn update_weight_and_parent(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        parent_id: DbId,
        sort_weight: SortWeight,
        actor: &Actor,
    ) -> Result<(), TreeError> {
        let mut savepoint = self.tx.begin().await.map_err(classify)?;
        let result = sqlx::query(
            "UPDATE category_nodes
             SET parent_id = $3, sort_weight = $4, updated_by_id = $5, updated_by_name = $6
             WHERE category_id = $1 AND id = $2",
        )
        .bind(category_id)
        .bind(node_id)
        .bind(parent_id)
        .bind(to_db(sort_weight)?)
        .bind(actor.id)
        .bind(&actor.name)
        .execute(&mut *savepoint)
        .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                savepoint.rollback().await.map_err(classify)?;
                Err(TreeError::NotFound {
                    entity: "CategoryNode",
                    id: node_id,
                })
            }
            Ok(_) => savepoint.commit().await.map_err(classify),
            Err(err) => {
                savepoint.rollback().await.map_err(classify)?;
                let err = classify(err);
                if matches!(err, TreeError::NameConflict { .. }) {
                    let name = self.node_name(category_id, node_id).await?;
                    return Err(with_name(err, &name));
                }
                Err(err)
            }
        }
    }

    async fn update_weight(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        sort_weight: SortWeight,
    ) -> Result<(), TreeError> {
        let mut savepoint = self.tx.begin().await.map_err(classify)?;
        let result = sqlx::query(
            "UPDATE category_nodes SET sort_weight = $3 WHERE category_id = $1 AND id = $2",
        )
        .bind(category_id)
        .bind(node_id)
        .bind(to_db(sort_weight)?)
        .execute(&mut *savepoint)
        .await;
        match result {
            Ok(_) => savepoint.commit().await.map_err(classify),
            Err(err) => {
                savepoint.rollback().await.map_err(classify)?;
                Err(classify(err))
            }
        }
    }

    async fn delete_by_ids(&mut self, category_id: DbId, ids: &[DbId]) -> Result<u64, TreeError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let done = sqlx::query("DELETE FROM category_nodes WHERE category_id = $1 AND id = ANY($2)")
            .bind(category_id)
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(done.rows_affected())
    }

    async fn touch_category(&mut self, category_id: DbId, actor: &Actor) -> Result<(), TreeError> {
        sqlx::query("UPDATE categories SET updated_by_id = $2, updated_by_name = $3 WHERE id = $1")
            .bind(category_id)
            .bind(actor.id)
            .bind(&actor.name)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), TreeError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self) -> Result<(), TreeError> {
        self.tx.rollback().await.map_err(classify)
    }
}
