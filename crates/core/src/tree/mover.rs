//! Relocation of a node, with its subtree, to a new parent and position.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::category::MAX_LAYER_LIMIT;
use crate::tree::error::TreeError;
use crate::tree::guard;
use crate::tree::placement::{self, Slot};
use crate::tree::retry::Attempt;
use crate::tree::store::{Actor, NodeTx};
use crate::types::{DbId, SortWeight, ROOT_PARENT_ID};

/// Request to move `node_id` under `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoveNode {
    pub category_id: DbId,
    pub node_id: DbId,
    pub parent_id: DbId,
    /// Sibling to land directly before; `None` appends at the tail.
    pub before_id: Option<DbId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved {
        parent_id: DbId,
        sort_weight: SortWeight,
    },
    /// The node already sat at the requested position; nothing was written.
    Unchanged,
}

/// One transaction's worth of a move.
pub(crate) struct MoveAttempt<'a> {
    pub request: &'a MoveNode,
    pub max_layer: i64,
    pub actor: &'a Actor,
}

#[async_trait]
impl<'a, T: NodeTx> Attempt<T> for MoveAttempt<'a> {
    type Output = MoveOutcome;

    fn name(&self) -> &'static str {
        "move_node"
    }

    async fn run(&self, tx: &mut T) -> Result<MoveOutcome, TreeError> {
        let MoveNode {
            category_id,
            node_id,
            parent_id,
            before_id,
        } = *self.request;

        if !tx.category_exists(category_id).await? {
            return Err(TreeError::NotFound {
                entity: "Category",
                id: category_id,
            });
        }
        tx.lock_parent_of(category_id, node_id)
            .await?
            .ok_or(TreeError::NotFound {
                entity: "CategoryNode",
                id: node_id,
            })?;
        if parent_id != ROOT_PARENT_ID {
            tx.find_node(category_id, parent_id)
                .await?
                .ok_or(TreeError::NotFound {
                    entity: "CategoryNode",
                    id: parent_id,
                })?;
        }

        guard::cycle_check(tx, category_id, node_id, parent_id, MAX_LAYER_LIMIT as usize + 1)
            .await?;

        if before_id == Some(node_id) {
            tracing::debug!(category_id, node_id, "Move before itself, nothing to do");
            return Ok(MoveOutcome::Unchanged);
        }

        let slot = match before_id {
            Some(next_id) => {
                placement::insert_before_sibling(tx, category_id, parent_id, next_id, Some(node_id))
                    .await?
            }
            None => placement::insert_at_tail(tx, category_id, parent_id, Some(node_id)).await?,
        };
        let sort_weight = match slot {
            Slot::At(w) => w,
            Slot::Unchanged => {
                tracing::debug!(category_id, node_id, parent_id, "Node already in place");
                return Ok(MoveOutcome::Unchanged);
            }
        };

        tx.update_weight_and_parent(category_id, node_id, parent_id, sort_weight, self.actor)
            .await?;

        let depth = guard::depth_of(tx, category_id, Some(node_id), parent_id, self.max_layer).await?;
        guard::ensure_within(depth, self.max_layer)?;

        tx.touch_category(category_id, self.actor).await?;
        tracing::debug!(category_id, node_id, parent_id, sort_weight, "Moved node");
        Ok(MoveOutcome::Moved {
            parent_id,
            sort_weight,
        })
    }
}
