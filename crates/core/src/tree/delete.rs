//! Cascading removal of a node and everything below it.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::tree::error::TreeError;
use crate::tree::retry::Attempt;
use crate::tree::store::{Actor, NodeTx};
use crate::types::DbId;

/// Ids of `root_id` and all of its descendants, breadth first.
///
/// Ids already seen are skipped, so a corrupted parent loop terminates.
pub async fn collect_subtree<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    root_id: DbId,
) -> Result<Vec<DbId>, TreeError> {
    let mut seen = HashSet::from([root_id]);
    let mut ids = vec![root_id];
    let mut frontier = vec![root_id];
    loop {
        let children = tx.child_ids(category_id, &frontier).await?;
        frontier = children.into_iter().filter(|id| seen.insert(*id)).collect();
        if frontier.is_empty() {
            return Ok(ids);
        }
        ids.extend_from_slice(&frontier);
    }
}

pub(crate) struct DeleteSubtreeAttempt<'a> {
    pub category_id: DbId,
    pub node_id: DbId,
    pub actor: &'a Actor,
}

#[async_trait]
impl<'a, T: NodeTx> Attempt<T> for DeleteSubtreeAttempt<'a> {
    type Output = u64;

    fn name(&self) -> &'static str {
        "delete_subtree"
    }

    async fn run(&self, tx: &mut T) -> Result<u64, TreeError> {
        let (category_id, node_id) = (self.category_id, self.node_id);
        if !tx.category_exists(category_id).await? {
            return Err(TreeError::NotFound {
                entity: "Category",
                id: category_id,
            });
        }
        tx.find_node(category_id, node_id)
            .await?
            .ok_or(TreeError::NotFound {
                entity: "CategoryNode",
                id: node_id,
            })?;

        let ids = collect_subtree(tx, category_id, node_id).await?;
        let removed = tx.delete_by_ids(category_id, &ids).await?;
        tx.touch_category(category_id, self.actor).await?;
        tracing::info!(category_id, node_id, removed, "Deleted subtree");
        Ok(removed)
    }
}
