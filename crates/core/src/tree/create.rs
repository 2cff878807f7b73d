//! Creation of a single node under an existing parent.

use async_trait::async_trait;
use serde::Deserialize;

use crate::tree::error::TreeError;
use crate::tree::guard;
use crate::tree::placement::{self, Position};
use crate::tree::retry::Attempt;
use crate::tree::store::{Actor, NewNode, NodeTx, TreeNode};
use crate::types::{DbId, ROOT_PARENT_ID};

/// Request to create `node` inside `category_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateNode {
    pub category_id: DbId,
    pub node: NewNode,
    /// `None` falls back to the configured insert position.
    pub position: Option<Position>,
}

pub(crate) struct CreateAttempt<'a> {
    pub request: &'a CreateNode,
    pub position: Position,
    pub max_layer: i64,
    pub actor: &'a Actor,
}

#[async_trait]
impl<'a, T: NodeTx> Attempt<T> for CreateAttempt<'a> {
    type Output = TreeNode;

    fn name(&self) -> &'static str {
        "create_node"
    }

    async fn run(&self, tx: &mut T) -> Result<TreeNode, TreeError> {
        let category_id = self.request.category_id;
        let parent_id = self.request.node.parent_id;

        if !tx.category_exists(category_id).await? {
            return Err(TreeError::NotFound {
                entity: "Category",
                id: category_id,
            });
        }
        if parent_id != ROOT_PARENT_ID {
            tx.find_node(category_id, parent_id)
                .await?
                .ok_or(TreeError::NotFound {
                    entity: "CategoryNode",
                    id: parent_id,
                })?;
        }

        let sort_weight = placement::place_new(tx, category_id, parent_id, self.position).await?;

        let depth = guard::depth_of(tx, category_id, None, parent_id, self.max_layer).await?;
        guard::ensure_within(depth, self.max_layer)?;

        let node = tx
            .insert(category_id, &self.request.node, sort_weight, self.actor)
            .await?;
        tx.touch_category(category_id, self.actor).await?;
        tracing::debug!(
            category_id,
            node_id = node.id,
            parent_id,
            sort_weight,
            "Created node"
        );
        Ok(node)
    }
}
