//! The bounded sort-weight space and the pure arithmetic over it.
//!
//! Weights are unsigned integers in `[ORIGIN, CEILING)`. The first child of
//! any parent lands on [`MID`], leaving equal room for prepends and appends.
//! Head and tail inserts step by [`START_GAP`] / [`INCREMENT`]; inserts
//! between two siblings bisect the gap. When a gap closes the sibling set
//! is rebalanced to evenly spaced weights ending at [`MID`].

use crate::tree::error::TreeError;
use crate::tree::store::SiblingKey;
use crate::types::{DbId, SortWeight};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Theoretical floor of the weight space.
pub const ORIGIN: SortWeight = 0;

/// Distance kept below the current minimum when prepending.
pub const START_GAP: SortWeight = 512;

/// Distance kept above the current maximum when appending, and the spacing
/// produced by a rebalance.
pub const INCREMENT: SortWeight = 512;

/// Exclusive upper bound of the weight space.
pub const CEILING: SortWeight = 1 << 62;

/// Weight of the first child of any parent.
pub const MID: SortWeight = 1 << 31;

/// Largest sibling set a rebalance can space out between [`ORIGIN`] and [`MID`].
pub const REBALANCE_CAPACITY: usize = (MID / INCREMENT) as usize + 1;

/// Result of probing one end of a sibling set for a free weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headroom {
    Available(SortWeight),
    /// The end of the weight space is reached; rebalance first.
    Exhausted,
}

// ---------------------------------------------------------------------------
// Slot arithmetic
// ---------------------------------------------------------------------------

/// Weight for a node prepended before the current minimum sibling weight.
pub fn head_weight(min: Option<SortWeight>) -> Headroom {
    match min {
        None => Headroom::Available(MID),
        Some(min) if min <= START_GAP => Headroom::Exhausted,
        Some(min) => Headroom::Available(min - START_GAP),
    }
}

/// Weight for a node appended after the current maximum sibling weight.
pub fn tail_weight(max: Option<SortWeight>) -> Headroom {
    match max {
        None => Headroom::Available(START_GAP),
        Some(max) if max >= CEILING - INCREMENT => Headroom::Exhausted,
        Some(max) => Headroom::Available(max + INCREMENT),
    }
}

/// Weight strictly between `predecessor` and `successor`.
///
/// A missing predecessor opens the range down to [`ORIGIN`]. Fails with
/// [`TreeError::ReorderRequired`] when no integer fits between the bounds.
pub fn between(
    predecessor: Option<SortWeight>,
    successor: SortWeight,
) -> Result<SortWeight, TreeError> {
    let low = predecessor.unwrap_or(ORIGIN);
    if successor <= low || successor - low <= 1 {
        return Err(TreeError::ReorderRequired);
    }
    let mid = low + (successor - low) / 2;
    if mid <= low || mid >= successor {
        return Err(TreeError::ReorderRequired);
    }
    Ok(mid)
}

// ---------------------------------------------------------------------------
// Rebalance plan
// ---------------------------------------------------------------------------

/// Fresh weights for a sibling set read in ascending order.
///
/// Assignments are returned in processing order: the highest sibling first
/// receives [`MID`], each following one [`INCREMENT`] less, so the relative
/// order is unchanged and the last entry holds the lowest weight. Returns
/// `None` when the running offset would drop below [`ORIGIN`].
pub fn rebalance_plan(ascending: &[SiblingKey]) -> Option<Vec<(DbId, SortWeight)>> {
    if ascending.len() > REBALANCE_CAPACITY {
        return None;
    }
    let mut offset = MID;
    let mut plan = Vec::with_capacity(ascending.len());
    for (i, sibling) in ascending.iter().rev().enumerate() {
        if i > 0 {
            offset = offset.checked_sub(INCREMENT)?;
        }
        if offset >= CEILING {
            return None;
        }
        plan.push((sibling.id, offset));
    }
    Some(plan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn key(id: DbId, sort_weight: SortWeight) -> SiblingKey {
        SiblingKey { id, sort_weight }
    }

    #[test]
    fn constants_match_the_weight_space() {
        assert_eq!(MID, 2_147_483_648);
        assert_eq!(CEILING, 4_611_686_018_427_387_904);
        assert!(MID < CEILING);
    }

    #[test]
    fn first_child_at_head_gets_mid() {
        assert_eq!(head_weight(None), Headroom::Available(MID));
    }

    #[test]
    fn head_steps_down_by_start_gap() {
        assert_eq!(
            head_weight(Some(MID)),
            Headroom::Available(2_147_483_136)
        );
    }

    #[test]
    fn head_exhausted_at_or_below_start_gap() {
        assert_eq!(head_weight(Some(START_GAP)), Headroom::Exhausted);
        assert_eq!(head_weight(Some(1)), Headroom::Exhausted);
        assert_eq!(head_weight(Some(0)), Headroom::Exhausted);
        assert_eq!(head_weight(Some(START_GAP + 1)), Headroom::Available(1));
    }

    #[test]
    fn first_child_at_tail_gets_start_gap() {
        assert_eq!(tail_weight(None), Headroom::Available(START_GAP));
    }

    #[test]
    fn tail_steps_up_by_increment() {
        assert_eq!(tail_weight(Some(512)), Headroom::Available(1024));
    }

    #[test]
    fn tail_never_reaches_ceiling() {
        assert_eq!(tail_weight(Some(CEILING - INCREMENT)), Headroom::Exhausted);
        assert_eq!(
            tail_weight(Some(CEILING - INCREMENT - 1)),
            Headroom::Available(CEILING - 1)
        );
    }

    #[test]
    fn between_bisects_gap() {
        assert_matches!(between(Some(100), 200), Ok(150));
        assert_matches!(between(Some(100), 103), Ok(101));
        assert_matches!(between(Some(100), 102), Ok(101));
    }

    #[test]
    fn between_without_predecessor_uses_origin() {
        assert_matches!(between(None, MID), Ok(w) if w == MID / 2);
        assert_matches!(between(None, 2), Ok(1));
    }

    #[test]
    fn between_adjacent_weights_requires_reorder() {
        assert_matches!(between(Some(0), 1), Err(TreeError::ReorderRequired));
        assert_matches!(between(Some(41), 42), Err(TreeError::ReorderRequired));
        assert_matches!(between(None, 1), Err(TreeError::ReorderRequired));
        assert_matches!(between(None, 0), Err(TreeError::ReorderRequired));
    }

    #[test]
    fn between_inverted_bounds_requires_reorder() {
        assert_matches!(between(Some(10), 10), Err(TreeError::ReorderRequired));
        assert_matches!(between(Some(11), 10), Err(TreeError::ReorderRequired));
    }

    #[test]
    fn rebalance_plan_preserves_order() {
        let siblings = vec![key(7, 0), key(3, 1), key(9, 2)];
        let plan = rebalance_plan(&siblings).unwrap();
        assert_eq!(
            plan,
            vec![(9, MID), (3, MID - INCREMENT), (7, MID - 2 * INCREMENT)]
        );
    }

    #[test]
    fn rebalance_plan_of_empty_set_is_empty() {
        assert_eq!(rebalance_plan(&[]), Some(vec![]));
    }

    #[test]
    fn rebalance_capacity_ends_at_origin() {
        let lowest = MID - (REBALANCE_CAPACITY as SortWeight - 1) * INCREMENT;
        assert_eq!(lowest, ORIGIN);
    }
}
