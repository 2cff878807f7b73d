//! Transactional row access the ordering engine runs against.
//!
//! [`NodeStore`] opens transactions; [`NodeTx`] is one open transaction.
//! Every operation is scoped to a single tree (`category_id`) and, where it
//! reads siblings, to one parent within it. Reads are plain snapshot reads
//! except [`NodeTx::siblings_ordered_asc_locked`], which row-locks the whole
//! sibling set for the rest of the transaction, and
//! [`NodeTx::lock_parent_of`], which locks one row of an ancestor chain.
//!
//! Writes that would give two siblings the same weight must fail with
//! [`TreeError::Conflict`] without poisoning the transaction, so a rebalance
//! can defer the row and try again later in the same transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tree::error::TreeError;
use crate::types::{DbId, SortWeight};

/// Identity stamped on created and updated rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: DbId,
    pub name: String,
}

/// Id and weight of one sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingKey {
    pub id: DbId,
    pub sort_weight: SortWeight,
}

/// The engine's view of a node row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: DbId,
    pub category_id: DbId,
    pub parent_id: DbId,
    pub name: String,
    pub owner_id: Option<DbId>,
    pub owner_name: Option<String>,
    pub required: bool,
    pub selected: bool,
    pub sort_weight: SortWeight,
}

/// Payload of a node about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewNode {
    pub parent_id: DbId,
    pub name: String,
    pub owner_id: Option<DbId>,
    pub owner_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub selected: bool,
}

/// Opens transactions over node rows.
#[async_trait]
pub trait NodeStore: Send + Sync {
    type Tx: NodeTx;

    async fn begin(&self) -> Result<Self::Tx, TreeError>;
}

/// One open transaction over node rows.
#[async_trait]
pub trait NodeTx: Send {
    /// Whether a live tree with this id exists.
    async fn category_exists(&mut self, category_id: DbId) -> Result<bool, TreeError>;

    async fn find_node(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<TreeNode>, TreeError>;

    /// Sibling with the lowest weight under `parent_id`.
    async fn min_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError>;

    /// Sibling with the highest weight under `parent_id`.
    async fn max_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError>;

    /// Sibling with the highest weight strictly below `weight`.
    async fn sibling_below(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
        weight: SortWeight,
    ) -> Result<Option<SiblingKey>, TreeError>;

    /// Every sibling under `parent_id`, ascending by weight, locked for update.
    async fn siblings_ordered_asc_locked(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Vec<SiblingKey>, TreeError>;

    /// One step up the ancestor chain. `None` when the node does not exist.
    async fn parent_of(&mut self, category_id: DbId, node_id: DbId)
        -> Result<Option<DbId>, TreeError>;

    /// Like [`NodeTx::parent_of`], but reads the latest committed parent and
    /// locks the row until the transaction ends. A move locks the moved row
    /// and the destination's whole ancestor chain this way, so two crossing
    /// moves cannot both pass the cycle check.
    async fn lock_parent_of(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, TreeError>;

    /// Ids of all direct children of any of `parent_ids`.
    async fn child_ids(
        &mut self,
        category_id: DbId,
        parent_ids: &[DbId],
    ) -> Result<Vec<DbId>, TreeError>;

    async fn insert(
        &mut self,
        category_id: DbId,
        node: &NewNode,
        sort_weight: SortWeight,
        actor: &Actor,
    ) -> Result<TreeNode, TreeError>;

    async fn update_weight_and_parent(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        parent_id: DbId,
        sort_weight: SortWeight,
        actor: &Actor,
    ) -> Result<(), TreeError>;

    async fn update_weight(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        sort_weight: SortWeight,
    ) -> Result<(), TreeError>;

    /// Remove the given nodes, returning how many rows went away.
    async fn delete_by_ids(&mut self, category_id: DbId, ids: &[DbId]) -> Result<u64, TreeError>;

    /// Stamp the tree's updater fields after a structural change.
    async fn touch_category(&mut self, category_id: DbId, actor: &Actor) -> Result<(), TreeError>;

    async fn commit(self) -> Result<(), TreeError>;

    async fn rollback(self) -> Result<(), TreeError>;
}
