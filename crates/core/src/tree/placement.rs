//! Weight computation for new and relocated nodes.

use serde::{Deserialize, Serialize};

use crate::tree::error::TreeError;
use crate::tree::rebalance::rebalance;
use crate::tree::store::NodeTx;
use crate::tree::weight::{self, Headroom, INCREMENT, MID};
use crate::types::{DbId, SortWeight};

/// Where a node lands among its new siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "sibling_id")]
pub enum Position {
    /// Before every existing sibling.
    Head,
    /// After every existing sibling.
    Tail,
    /// Directly before the given sibling.
    Before(DbId),
}

/// Outcome of computing a slot for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    At(SortWeight),
    /// The moving node already occupies the requested position.
    Unchanged,
}

/// Weight for a node prepended under `parent_id`.
///
/// Rebalances the sibling set once when the minimum weight leaves no room
/// below it.
pub async fn create_at_head<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
) -> Result<SortWeight, TreeError> {
    let mut rebalanced = false;
    loop {
        let min = tx.min_sibling_weight(category_id, parent_id).await?;
        match weight::head_weight(min.map(|k| k.sort_weight)) {
            Headroom::Available(w) => return Ok(w),
            Headroom::Exhausted if rebalanced => {
                return Err(TreeError::CapacityExhausted { parent_id })
            }
            Headroom::Exhausted => {
                rebalance(tx, category_id, parent_id).await?;
                rebalanced = true;
            }
        }
    }
}

/// Weight for a node placed directly before `next_id` under `parent_id`.
///
/// Returns [`Slot::Unchanged`] when `moving` already sits right before
/// `next_id`. When no integer is left between `next_id` and its
/// predecessor, the sibling set is rebalanced in the same transaction and
/// the slot computed again, so a later failure rolls the rebalance back
/// with everything else.
pub async fn insert_before_sibling<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
    next_id: DbId,
    moving: Option<DbId>,
) -> Result<Slot, TreeError> {
    let mut rebalanced = false;
    loop {
        match slot_before(tx, category_id, parent_id, next_id, moving).await {
            Err(TreeError::ReorderRequired) if rebalanced => {
                return Err(TreeError::CapacityExhausted { parent_id })
            }
            Err(TreeError::ReorderRequired) => {
                tracing::debug!(
                    category_id,
                    parent_id,
                    next_id,
                    "No gap between neighbours, rebalancing"
                );
                rebalance(tx, category_id, parent_id).await?;
                rebalanced = true;
            }
            result => return result,
        }
    }
}

/// One read of `next_id` and its predecessor. Fails with
/// [`TreeError::ReorderRequired`] when the gap between them is closed.
async fn slot_before<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
    next_id: DbId,
    moving: Option<DbId>,
) -> Result<Slot, TreeError> {
    let next = tx
        .find_node(category_id, next_id)
        .await?
        .ok_or(TreeError::NotFound {
            entity: "CategoryNode",
            id: next_id,
        })?;
    if next.parent_id != parent_id {
        return Err(TreeError::InvalidPosition(format!(
            "Node {next_id} is not a child of {parent_id}"
        )));
    }

    let predecessor = tx
        .sibling_below(category_id, parent_id, next.sort_weight)
        .await?;
    if let (Some(pred), Some(moving)) = (predecessor, moving) {
        if pred.id == moving {
            return Ok(Slot::Unchanged);
        }
    }

    let w = weight::between(predecessor.map(|k| k.sort_weight), next.sort_weight)?;
    Ok(Slot::At(w))
}

/// Weight for a node appended under `parent_id`.
///
/// Returns [`Slot::Unchanged`] when `moving` is already the last sibling.
/// Rebalances when the maximum weight is too close to the ceiling; the
/// rebalanced set tops out at [`MID`], so the tail slot is `MID + INCREMENT`.
pub async fn insert_at_tail<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
    moving: Option<DbId>,
) -> Result<Slot, TreeError> {
    let max = tx.max_sibling_weight(category_id, parent_id).await?;
    if let (Some(last), Some(moving)) = (max, moving) {
        if last.id == moving {
            return Ok(Slot::Unchanged);
        }
    }

    match weight::tail_weight(max.map(|k| k.sort_weight)) {
        Headroom::Available(w) => Ok(Slot::At(w)),
        Headroom::Exhausted => {
            rebalance(tx, category_id, parent_id).await?;
            Ok(Slot::At(MID + INCREMENT))
        }
    }
}

/// Weight for a brand-new node at `position` under `parent_id`.
pub async fn place_new<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
    position: Position,
) -> Result<SortWeight, TreeError> {
    let slot = match position {
        Position::Head => Slot::At(create_at_head(tx, category_id, parent_id).await?),
        Position::Tail => insert_at_tail(tx, category_id, parent_id, None).await?,
        Position::Before(next_id) => {
            insert_before_sibling(tx, category_id, parent_id, next_id, None).await?
        }
    };
    match slot {
        Slot::At(w) => Ok(w),
        Slot::Unchanged => Err(TreeError::Internal(
            "New node cannot already occupy a slot".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
