//! Structural checks: cycle prevention and layer-limit measurement.
//!
//! Both walk the flat rows iteratively, one `parent_of` step or one
//! `child_ids` frontier at a time. The walks are bounded by the layer limit,
//! so a corrupted parent chain cannot loop forever.

use crate::tree::error::TreeError;
use crate::tree::store::NodeTx;
use crate::types::{DbId, ROOT_PARENT_ID};

/// Fail with [`TreeError::Cycle`] if `node_id` is `parent_id` or one of
/// its ancestors, i.e. if moving `node_id` under `parent_id` would close a
/// loop.
///
/// Every row on the walk is locked through [`NodeTx::lock_parent_of`], so
/// the chain cannot change under the caller before it commits.
///
/// `max_steps` bounds the walk; a longer chain means the stored tree is
/// already inconsistent.
pub async fn cycle_check<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    node_id: DbId,
    parent_id: DbId,
    max_steps: usize,
) -> Result<(), TreeError> {
    let mut current = parent_id;
    let mut steps = 0;
    while current != ROOT_PARENT_ID {
        if current == node_id {
            return Err(TreeError::Cycle { node_id, parent_id });
        }
        steps += 1;
        if steps > max_steps {
            return Err(TreeError::Internal(format!(
                "Ancestor chain of node {parent_id} exceeds {max_steps} steps"
            )));
        }
        current = tx
            .lock_parent_of(category_id, current)
            .await?
            .ok_or(TreeError::NotFound {
                entity: "CategoryNode",
                id: current,
            })?;
    }
    Ok(())
}

/// Number of real nodes from `parent_id` up to the root sentinel.
///
/// A node placed under `parent_id` sits at layer `ancestors + 1`. Fails
/// with [`TreeError::DepthOverflow`] as soon as even a leaf would not fit.
pub async fn ancestor_count<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
    max_layer: i64,
) -> Result<i64, TreeError> {
    let mut up = 0;
    let mut current = parent_id;
    while current != ROOT_PARENT_ID {
        up += 1;
        if up + 1 > max_layer {
            return Err(TreeError::DepthOverflow {
                depth: up + 1,
                max_layer,
            });
        }
        current = tx
            .parent_of(category_id, current)
            .await?
            .ok_or(TreeError::NotFound {
                entity: "CategoryNode",
                id: current,
            })?;
    }
    Ok(up)
}

/// Height of the subtree rooted at `node_id`, counting the node itself.
///
/// Stops expanding once the height reaches `limit`, returning `limit`.
pub async fn subtree_height<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    node_id: DbId,
    limit: i64,
) -> Result<i64, TreeError> {
    let mut frontier = vec![node_id];
    let mut rounds = 0;
    while !frontier.is_empty() {
        rounds += 1;
        if rounds >= limit {
            break;
        }
        frontier = tx.child_ids(category_id, &frontier).await?;
    }
    Ok(rounds)
}

/// Layer of the deepest node once `node_id` (with its subtree) hangs under
/// `parent_id`. `None` measures a fresh leaf.
///
/// Callers reject the operation when the result exceeds `max_layer`.
pub async fn depth_of<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    node_id: Option<DbId>,
    parent_id: DbId,
    max_layer: i64,
) -> Result<i64, TreeError> {
    let up = ancestor_count(tx, category_id, parent_id, max_layer).await?;
    let down = match node_id {
        Some(id) => subtree_height(tx, category_id, id, max_layer - up + 1).await?,
        None => 1,
    };
    Ok(up + down)
}

/// Reject a measured depth beyond `max_layer`.
pub fn ensure_within(depth: i64, max_layer: i64) -> Result<(), TreeError> {
    if depth > max_layer {
        return Err(TreeError::DepthOverflow { depth, max_layer });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
