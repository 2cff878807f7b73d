//! Entry points the category service calls.
//!
//! [`CategoryTree`] wraps a [`NodeStore`] with the configured layer limit,
//! default insert position, and retry policy. Each operation runs through
//! [`run_with_retry`], so callers see either a committed result or an error
//! with the tree left as it was.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::category::{validate_max_layer, validate_name, DEFAULT_MAX_LAYER};
use crate::tree::create::{CreateAttempt, CreateNode};
use crate::tree::delete::DeleteSubtreeAttempt;
use crate::tree::error::TreeError;
use crate::tree::mover::{MoveAttempt, MoveNode, MoveOutcome};
use crate::tree::placement::Position;
use crate::tree::rebalance::rebalance;
use crate::tree::retry::{run_with_retry, Attempt, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::tree::store::{Actor, NodeStore, NodeTx, TreeNode};
use crate::types::{DbId, SortWeight, ROOT_PARENT_ID};

/// Position a new node takes when the caller does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    /// Newest first.
    #[default]
    Head,
    Tail,
}

impl InsertPosition {
    pub fn as_position(self) -> Position {
        match self {
            InsertPosition::Head => Position::Head,
            InsertPosition::Tail => Position::Tail,
        }
    }
}

impl std::str::FromStr for InsertPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Ok(InsertPosition::Head),
            "tail" => Ok(InsertPosition::Tail),
            other => Err(format!("expected 'head' or 'tail', got '{other}'")),
        }
    }
}

/// Tunables of the ordering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Layer limit applied when a call does not pass its own.
    pub max_layer: i64,
    pub insert_position: InsertPosition,
    pub retry: RetryPolicy,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_layer: DEFAULT_MAX_LAYER,
            insert_position: InsertPosition::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl TreeConfig {
    /// Load engine tunables from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `CATEGORY_MAX_LAYER`       | `20`    |
    /// | `CATEGORY_INSERT_POSITION` | `head`  |
    /// | `CATEGORY_MAX_ATTEMPTS`    | `3`     |
    /// | `CATEGORY_BACKOFF_MIN_MS`  | `100`   |
    /// | `CATEGORY_BACKOFF_MAX_MS`  | `400`   |
    pub fn from_env() -> Self {
        let max_layer: i64 = std::env::var("CATEGORY_MAX_LAYER")
            .unwrap_or_else(|_| DEFAULT_MAX_LAYER.to_string())
            .parse()
            .expect("CATEGORY_MAX_LAYER must be a valid i64");
        if let Err(e) = validate_max_layer(max_layer) {
            panic!("CATEGORY_MAX_LAYER is out of range: {e}");
        }

        let insert_position: InsertPosition = std::env::var("CATEGORY_INSERT_POSITION")
            .unwrap_or_else(|_| "head".into())
            .parse()
            .unwrap_or_else(|e| panic!("CATEGORY_INSERT_POSITION is invalid: {e}"));

        let max_attempts: u32 = std::env::var("CATEGORY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
            .parse()
            .expect("CATEGORY_MAX_ATTEMPTS must be a valid u32");

        let backoff_min_ms: u64 = std::env::var("CATEGORY_BACKOFF_MIN_MS")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("CATEGORY_BACKOFF_MIN_MS must be a valid u64");

        let backoff_max_ms: u64 = std::env::var("CATEGORY_BACKOFF_MAX_MS")
            .unwrap_or_else(|_| "400".into())
            .parse()
            .expect("CATEGORY_BACKOFF_MAX_MS must be a valid u64");

        Self {
            max_layer,
            insert_position,
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                backoff_min: Duration::from_millis(backoff_min_ms),
                backoff_max: Duration::from_millis(backoff_max_ms.max(backoff_min_ms)),
            },
        }
    }
}

/// Ordering engine bound to one store.
#[derive(Debug, Clone)]
pub struct CategoryTree<S> {
    store: S,
    config: TreeConfig,
}

impl<S: NodeStore> CategoryTree<S> {
    pub fn new(store: S, config: TreeConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    fn layer_limit(&self, max_layer: Option<i64>) -> Result<i64, TreeError> {
        let max_layer = max_layer.unwrap_or(self.config.max_layer);
        validate_max_layer(max_layer)?;
        Ok(max_layer)
    }

    /// Create a node under `request.node.parent_id` and return the stored row.
    pub async fn create_node(
        &self,
        request: &CreateNode,
        max_layer: Option<i64>,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<TreeNode, TreeError> {
        validate_name("Node", &request.node.name)?;
        let attempt = CreateAttempt {
            request,
            position: request
                .position
                .unwrap_or_else(|| self.config.insert_position.as_position()),
            max_layer: self.layer_limit(max_layer)?,
            actor,
        };
        run_with_retry(&self.store, &self.config.retry, cancel, &attempt).await
    }

    /// Move a node, and implicitly its subtree, to a new parent/position.
    pub async fn move_node(
        &self,
        request: &MoveNode,
        max_layer: Option<i64>,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<MoveOutcome, TreeError> {
        let attempt = MoveAttempt {
            request,
            max_layer: self.layer_limit(max_layer)?,
            actor,
        };
        run_with_retry(&self.store, &self.config.retry, cancel, &attempt).await
    }

    /// Delete a node and all of its descendants. Returns the number removed.
    pub async fn delete_subtree(
        &self,
        category_id: DbId,
        node_id: DbId,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<u64, TreeError> {
        let attempt = DeleteSubtreeAttempt {
            category_id,
            node_id,
            actor,
        };
        run_with_retry(&self.store, &self.config.retry, cancel, &attempt).await
    }

    /// Respace the children of `parent_id` on demand.
    pub async fn rebalance(
        &self,
        category_id: DbId,
        parent_id: DbId,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> Result<Option<SortWeight>, TreeError> {
        let attempt = RebalanceAttempt {
            category_id,
            parent_id,
            actor,
        };
        run_with_retry(&self.store, &self.config.retry, cancel, &attempt).await
    }
}

struct RebalanceAttempt<'a> {
    category_id: DbId,
    parent_id: DbId,
    actor: &'a Actor,
}

#[async_trait]
impl<'a, T: NodeTx> Attempt<T> for RebalanceAttempt<'a> {
    type Output = Option<SortWeight>;

    fn name(&self) -> &'static str {
        "rebalance"
    }

    async fn run(&self, tx: &mut T) -> Result<Option<SortWeight>, TreeError> {
        if !tx.category_exists(self.category_id).await? {
            return Err(TreeError::NotFound {
                entity: "Category",
                id: self.category_id,
            });
        }
        if self.parent_id != ROOT_PARENT_ID {
            tx.find_node(self.category_id, self.parent_id)
                .await?
                .ok_or(TreeError::NotFound {
                    entity: "CategoryNode",
                    id: self.parent_id,
                })?;
        }
        let lowest = rebalance(tx, self.category_id, self.parent_id).await?;
        tx.touch_category(self.category_id, self.actor).await?;
        Ok(lowest)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::tree::store::NewNode;
    use crate::tree::weight::{CEILING, INCREMENT, MID};
    use assert_matches::assert_matches;

    fn actor() -> Actor {
        Actor {
            id: 7,
            name: "curator".to_string(),
        }
    }

    fn engine(store: &MemoryStore) -> CategoryTree<MemoryStore> {
        CategoryTree::new(store.clone(), TreeConfig::default())
    }

    fn create(category_id: DbId, parent_id: DbId, name: &str, position: Option<Position>) -> CreateNode {
        CreateNode {
            category_id,
            node: NewNode {
                parent_id,
                name: name.to_string(),
                owner_id: None,
                owner_name: None,
                required: false,
                selected: false,
            },
            position,
        }
    }

    fn names(store: &MemoryStore, category_id: DbId, parent_id: DbId) -> Vec<String> {
        store
            .children(category_id, parent_id)
            .into_iter()
            .map(|n| n.name)
            .collect()
    }

    fn assert_unique_weights(store: &MemoryStore, category_id: DbId, parent_id: DbId) {
        let children = store.children(category_id, parent_id);
        let weights: HashSet<SortWeight> = children.iter().map(|n| n.sort_weight).collect();
        assert_eq!(weights.len(), children.len());
        assert!(children.iter().all(|n| n.sort_weight < CEILING));
    }

    // -- create --

    #[tokio::test]
    async fn first_child_lands_at_mid() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);

        let node = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "C1", None), None, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(node.sort_weight, 2_147_483_648);
        assert_eq!(store.category_updated_by(cat), Some(actor()));
    }

    #[tokio::test]
    async fn head_insert_goes_before_existing_children() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        tree.create_node(&create(cat, ROOT_PARENT_ID, "C1", None), None, &actor(), &cancel)
            .await
            .unwrap();
        let c2 = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "C2", None), None, &actor(), &cancel)
            .await
            .unwrap();

        assert_eq!(c2.sort_weight, 2_147_483_136);
        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["C2", "C1"]);
    }

    #[tokio::test]
    async fn head_weights_strictly_decrease() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let mut previous = SortWeight::MAX;
        for i in 0..20 {
            let node = tree
                .create_node(&create(cat, ROOT_PARENT_ID, &format!("n{i}"), None), None, &actor(), &cancel)
                .await
                .unwrap();
            assert!(node.sort_weight < previous);
            previous = node.sort_weight;
        }
        assert_unique_weights(&store, cat, ROOT_PARENT_ID);
    }

    #[tokio::test]
    async fn tail_insert_appends_one_increment_up() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let parent = store.seed_node(cat, ROOT_PARENT_ID, "P", MID).id;
        store.seed_node(cat, parent, "first", 512);
        let tree = engine(&store);

        let node = tree
            .create_node(
                &create(cat, parent, "last", Some(Position::Tail)),
                None,
                &actor(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(node.sort_weight, 1024);
        assert_eq!(names(&store, cat, parent), ["first", "last"]);
    }

    #[tokio::test]
    async fn configured_tail_position_applies_when_none_is_given() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = CategoryTree::new(
            store.clone(),
            TreeConfig {
                insert_position: InsertPosition::Tail,
                ..TreeConfig::default()
            },
        );
        let cancel = CancellationToken::new();

        for name in ["a", "b", "c"] {
            tree.create_node(&create(cat, ROOT_PARENT_ID, name, None), None, &actor(), &cancel)
                .await
                .unwrap();
        }
        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn closed_gap_rebalances_then_inserts() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        store.seed_node(cat, ROOT_PARENT_ID, "A", 0);
        let b = store.seed_node(cat, ROOT_PARENT_ID, "B", 1).id;
        let tree = engine(&store);

        let node = tree
            .create_node(
                &create(cat, ROOT_PARENT_ID, "N", Some(Position::Before(b))),
                None,
                &actor(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["A", "N", "B"]);
        assert_eq!(store.node(b).unwrap().sort_weight, MID);
        assert!(node.sort_weight > MID - INCREMENT && node.sort_weight < MID);
        assert_unique_weights(&store, cat, ROOT_PARENT_ID);
    }

    #[tokio::test]
    async fn exhausted_head_rebalances_in_place() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let low = store.seed_node(cat, ROOT_PARENT_ID, "low", 512).id;
        let tree = engine(&store);

        let node = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "new", None), None, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.node(low).unwrap().sort_weight, MID);
        assert_eq!(node.sort_weight, MID - INCREMENT);
        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["new", "low"]);
    }

    #[tokio::test]
    async fn tail_near_ceiling_rebalances_first() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let high = store
            .seed_node(cat, ROOT_PARENT_ID, "high", CEILING - INCREMENT)
            .id;
        let tree = engine(&store);

        let node = tree
            .create_node(
                &create(cat, ROOT_PARENT_ID, "after", Some(Position::Tail)),
                None,
                &actor(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(store.node(high).unwrap().sort_weight, MID);
        assert_eq!(node.sort_weight, MID + INCREMENT);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let err = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "  ", None), None, &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::Validation(_));

        let err = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "ok", None), Some(0), &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::Validation(_));

        let err = tree
            .create_node(&create(cat + 1, ROOT_PARENT_ID, "ok", None), None, &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::NotFound { entity: "Category", .. });

        let err = tree
            .create_node(&create(cat, 999, "ok", None), None, &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::NotFound { entity: "CategoryNode", id: 999 });

        assert_eq!(store.node_count(cat), 0);
    }

    #[tokio::test]
    async fn duplicate_sibling_name_is_not_retried() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        store.seed_node(cat, ROOT_PARENT_ID, "Shots", MID);
        let tree = engine(&store);

        let err = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "Shots", None), None, &actor(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::NameConflict { ref name } if name == "Shots");
        assert_eq!(store.node_count(cat), 1);
    }

    #[tokio::test]
    async fn create_respects_layer_limit() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let b = store.seed_node(cat, a, "b", MID).id;
        let c = store.seed_node(cat, b, "c", MID).id;
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let err = tree
            .create_node(&create(cat, c, "d", None), Some(3), &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::DepthOverflow { depth: 4, max_layer: 3 });
        assert_eq!(store.node_count(cat), 3);

        tree.create_node(&create(cat, b, "c2", None), Some(3), &actor(), &cancel)
            .await
            .unwrap();
        assert_eq!(store.node_count(cat), 4);
    }

    // -- move --

    #[tokio::test]
    async fn move_into_own_subtree_is_a_cycle() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let b = store.seed_node(cat, a, "b", MID).id;
        let c = store.seed_node(cat, b, "c", MID).id;
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        for parent_id in [a, c] {
            let request = MoveNode {
                category_id: cat,
                node_id: a,
                parent_id,
                before_id: None,
            };
            let err = tree.move_node(&request, None, &actor(), &cancel).await.unwrap_err();
            assert_matches!(err, TreeError::Cycle { node_id, .. } if node_id == a);
        }

        assert_eq!(store.node(a).unwrap().parent_id, ROOT_PARENT_ID);
        assert_eq!(store.node(c).unwrap().parent_id, b);
        assert_eq!(store.category_updated_by(cat), None);
    }

    #[tokio::test]
    async fn move_checks_the_whole_subtree_height() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let b = store.seed_node(cat, a, "b", MID).id;
        let x = store.seed_node(cat, ROOT_PARENT_ID, "x", MID + INCREMENT).id;
        store.seed_node(cat, x, "y", MID);
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let too_deep = MoveNode {
            category_id: cat,
            node_id: x,
            parent_id: b,
            before_id: None,
        };
        let err = tree
            .move_node(&too_deep, Some(3), &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::DepthOverflow { depth: 4, max_layer: 3 });
        assert_eq!(store.node(x).unwrap().parent_id, ROOT_PARENT_ID);

        let fits = MoveNode {
            parent_id: a,
            ..too_deep
        };
        let outcome = tree.move_node(&fits, Some(3), &actor(), &cancel).await.unwrap();
        assert_matches!(outcome, MoveOutcome::Moved { parent_id, .. } if parent_id == a);
        assert_eq!(names(&store, cat, a), ["b", "x"]);
    }

    #[tokio::test]
    async fn move_before_sibling_reorders() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", 512).id;
        store.seed_node(cat, ROOT_PARENT_ID, "b", 1024);
        let c = store.seed_node(cat, ROOT_PARENT_ID, "c", 1536).id;
        let tree = engine(&store);

        let request = MoveNode {
            category_id: cat,
            node_id: c,
            parent_id: ROOT_PARENT_ID,
            before_id: Some(a),
        };
        let outcome = tree
            .move_node(&request, None, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                parent_id: ROOT_PARENT_ID,
                sort_weight: 256
            }
        );
        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["c", "a", "b"]);
        assert_eq!(store.category_updated_by(cat), Some(actor()));
    }

    #[tokio::test]
    async fn rejected_move_rolls_back_its_rebalance() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let c0 = store.seed_node(cat, a, "c0", 0).id;
        let c1 = store.seed_node(cat, a, "c1", 1).id;
        let x = store.seed_node(cat, ROOT_PARENT_ID, "x", MID + INCREMENT).id;
        store.seed_node(cat, x, "y", MID);
        let tree = engine(&store);

        // Landing between c0 and c1 needs a rebalance of a's children, but
        // x brings a child along and overflows two layers.
        let request = MoveNode {
            category_id: cat,
            node_id: x,
            parent_id: a,
            before_id: Some(c1),
        };
        let err = tree
            .move_node(&request, Some(2), &actor(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, TreeError::DepthOverflow { depth: 3, max_layer: 2 });
        assert_eq!(store.node(c0).unwrap().sort_weight, 0);
        assert_eq!(store.node(c1).unwrap().sort_weight, 1);
        assert_eq!(store.node(x).unwrap().parent_id, ROOT_PARENT_ID);
        assert_eq!(store.category_updated_by(cat), None);
    }

    #[tokio::test]
    async fn move_into_closed_gap_rebalances_and_lands() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        store.seed_node(cat, a, "c0", 0);
        let c1 = store.seed_node(cat, a, "c1", 1).id;
        let x = store.seed_node(cat, ROOT_PARENT_ID, "x", MID + INCREMENT).id;
        let tree = engine(&store);

        let request = MoveNode {
            category_id: cat,
            node_id: x,
            parent_id: a,
            before_id: Some(c1),
        };
        let outcome = tree
            .move_node(&request, None, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                parent_id: a,
                sort_weight: MID - INCREMENT / 2
            }
        );
        assert_eq!(names(&store, cat, a), ["c0", "x", "c1"]);
        assert_unique_weights(&store, cat, a);
    }

    #[tokio::test]
    async fn moves_to_the_current_slot_are_noops() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", 512).id;
        let b = store.seed_node(cat, ROOT_PARENT_ID, "b", 1024).id;
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let cases = [
            (a, Some(a)),
            (a, Some(b)),
            (b, None),
        ];
        for (node_id, before_id) in cases {
            let request = MoveNode {
                category_id: cat,
                node_id,
                parent_id: ROOT_PARENT_ID,
                before_id,
            };
            let outcome = tree.move_node(&request, None, &actor(), &cancel).await.unwrap();
            assert_eq!(outcome, MoveOutcome::Unchanged);
        }
        assert_eq!(store.node(a).unwrap().sort_weight, 512);
        assert_eq!(store.node(b).unwrap().sort_weight, 1024);
    }

    #[tokio::test]
    async fn move_before_node_under_other_parent_is_rejected() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", 512).id;
        let b = store.seed_node(cat, ROOT_PARENT_ID, "b", 1024).id;
        let child = store.seed_node(cat, a, "child", 512).id;
        let tree = engine(&store);

        let request = MoveNode {
            category_id: cat,
            node_id: b,
            parent_id: ROOT_PARENT_ID,
            before_id: Some(child),
        };
        let err = tree
            .move_node(&request, None, &actor(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::InvalidPosition(_));
    }

    // -- delete / rebalance --

    #[tokio::test]
    async fn delete_removes_every_descendant() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let b = store.seed_node(cat, a, "b", MID).id;
        store.seed_node(cat, b, "c", MID);
        store.seed_node(cat, a, "d", MID + INCREMENT);
        let keep = store.seed_node(cat, ROOT_PARENT_ID, "keep", MID + INCREMENT).id;
        let tree = engine(&store);

        let removed = tree
            .delete_subtree(cat, a, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(removed, 4);
        assert_eq!(store.node_count(cat), 1);
        assert!(store.node(keep).is_some());
        assert_eq!(store.category_updated_by(cat), Some(actor()));
    }

    #[tokio::test]
    async fn delete_of_missing_node_is_not_found() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);

        let err = tree
            .delete_subtree(cat, 42, &actor(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::NotFound { id: 42, .. });
    }

    #[tokio::test]
    async fn explicit_rebalance_keeps_order() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        for (name, w) in [("a", 1), ("b", 2), ("c", 3)] {
            store.seed_node(cat, ROOT_PARENT_ID, name, w);
        }
        let tree = engine(&store);

        let lowest = tree
            .rebalance(cat, ROOT_PARENT_ID, &actor(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(lowest, Some(MID - 2 * INCREMENT));
        assert_eq!(names(&store, cat, ROOT_PARENT_ID), ["a", "b", "c"]);
        let weights: Vec<SortWeight> = store
            .children(cat, ROOT_PARENT_ID)
            .iter()
            .map(|n| n.sort_weight)
            .collect();
        assert_eq!(weights, [MID - 1024, MID - 512, MID]);
    }

    #[tokio::test]
    async fn rebalance_of_empty_parent_returns_none() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let leaf = store.seed_node(cat, ROOT_PARENT_ID, "leaf", MID).id;
        let tree = engine(&store);

        let lowest = tree
            .rebalance(cat, leaf, &actor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(lowest, None);
    }

    // -- retry --

    #[tokio::test(start_paused = true)]
    async fn injected_commit_failures_are_absorbed() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        store.fail_next_commits(2);
        tree.create_node(&create(cat, ROOT_PARENT_ID, "kept", None), None, &actor(), &cancel)
            .await
            .unwrap();
        assert_eq!(store.node_count(cat), 1);

        store.fail_next_commits(3);
        let err = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "lost", None), None, &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::RetriesExhausted { attempts: 3, .. });
        assert_eq!(store.node_count(cat), 1);
    }

    #[tokio::test]
    async fn cancelled_operation_writes_nothing() {
        let store = MemoryStore::new();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tree
            .create_node(&create(cat, ROOT_PARENT_ID, "n", None), None, &actor(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, TreeError::Cancelled);
        assert_eq!(store.node_count(cat), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_budget_absorbs_three_concurrent_head_inserts() {
        let store = MemoryStore::interleaving();
        let cat = store.add_category("Assets");
        let tree = engine(&store);
        assert_eq!(tree.config().retry, RetryPolicy::default());

        let handles: Vec<_> = ["w0", "w1", "w2"]
            .into_iter()
            .map(|name| {
                let tree = tree.clone();
                tokio::spawn(async move {
                    let request = create(cat, ROOT_PARENT_ID, name, None);
                    let cancel = CancellationToken::new();
                    tree.create_node(&request, None, &actor(), &cancel).await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let weights: Vec<SortWeight> = store
            .children(cat, ROOT_PARENT_ID)
            .iter()
            .map(|n| n.sort_weight)
            .collect();
        assert_eq!(weights, vec![MID - 2 * INCREMENT, MID - INCREMENT, MID]);
    }

    #[tokio::test(start_paused = true)]
    async fn crossing_moves_cannot_close_a_loop() {
        let store = MemoryStore::interleaving();
        let cat = store.add_category("Assets");
        let a = store.seed_node(cat, ROOT_PARENT_ID, "a", MID).id;
        let b = store.seed_node(cat, ROOT_PARENT_ID, "b", MID + INCREMENT).id;
        let tree = engine(&store);
        let cancel = CancellationToken::new();

        let a_under_b = MoveNode {
            category_id: cat,
            node_id: a,
            parent_id: b,
            before_id: None,
        };
        let b_under_a = MoveNode {
            category_id: cat,
            node_id: b,
            parent_id: a,
            before_id: None,
        };
        let by = actor();
        let (first, second) = tokio::join!(
            tree.move_node(&a_under_b, None, &by, &cancel),
            tree.move_node(&b_under_a, None, &by, &cancel),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(TreeError::Cycle { .. }))));
        assert_eq!(names(&store, cat, ROOT_PARENT_ID).len(), 1);
    }

    /// A writer only fails when another writer committed first, so
    /// `WRITERS` attempts are always enough.
    #[tokio::test]
    async fn concurrent_head_inserts_converge() {
        const WRITERS: u32 = 8;

        let store = MemoryStore::interleaving();
        let cat = store.add_category("Assets");
        let tree = CategoryTree::new(
            store.clone(),
            TreeConfig {
                retry: RetryPolicy {
                    max_attempts: WRITERS,
                    backoff_min: Duration::ZERO,
                    backoff_max: Duration::ZERO,
                },
                ..TreeConfig::default()
            },
        );

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let tree = tree.clone();
                tokio::spawn(async move {
                    let request = create(cat, ROOT_PARENT_ID, &format!("w{i}"), None);
                    let cancel = CancellationToken::new();
                    tree.create_node(&request, None, &actor(), &cancel).await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.node_count(cat), WRITERS as usize);
        assert_unique_weights(&store, cat, ROOT_PARENT_ID);
    }

    #[test]
    fn insert_position_parses_case_insensitively() {
        assert_eq!("HEAD".parse::<InsertPosition>(), Ok(InsertPosition::Head));
        assert_eq!(" tail ".parse::<InsertPosition>(), Ok(InsertPosition::Tail));
        assert!("middle".parse::<InsertPosition>().is_err());
    }
}
