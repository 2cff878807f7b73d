//! Full-sibling-set rebalancing.

use crate::tree::error::TreeError;
use crate::tree::store::NodeTx;
use crate::tree::weight;
use crate::types::{DbId, SortWeight};

/// Respace every child of `parent_id` evenly, keeping their order.
///
/// The sibling set is row-locked for the rest of the transaction. Rows are
/// rewritten one at a time from the highest down; a row whose new weight is
/// still held by a sibling that has not moved yet is deferred, and deferred
/// rows are applied again in reverse once the first pass has vacated the
/// lower weights.
///
/// Returns the lowest weight assigned, or `None` for an empty sibling set.
pub async fn rebalance<T: NodeTx + ?Sized>(
    tx: &mut T,
    category_id: DbId,
    parent_id: DbId,
) -> Result<Option<SortWeight>, TreeError> {
    let siblings = tx
        .siblings_ordered_asc_locked(category_id, parent_id)
        .await?;
    let plan =
        weight::rebalance_plan(&siblings).ok_or(TreeError::CapacityExhausted { parent_id })?;

    let mut deferred = Vec::new();
    for (&(id, target), sibling) in plan.iter().zip(siblings.iter().rev()) {
        if sibling.sort_weight == target {
            continue;
        }
        match tx.update_weight(category_id, id, target).await {
            Ok(()) => {}
            Err(err) if err.is_retryable() => deferred.push((id, target)),
            Err(err) => return Err(err),
        }
    }

    if !deferred.is_empty() {
        tracing::debug!(
            category_id,
            parent_id,
            deferred = deferred.len(),
            "Re-applying deferred rebalance rows"
        );
    }
    for &(id, target) in deferred.iter().rev() {
        tx.update_weight(category_id, id, target).await?;
    }

    let lowest = plan.last().map(|&(_, w)| w);
    tracing::info!(
        category_id,
        parent_id,
        siblings = plan.len(),
        lowest_weight = ?lowest,
        "Rebalanced sibling weights"
    );
    Ok(lowest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
