//! In-process [`NodeStore`] for tests and embedded use.
//!
//! Transactions work on a private snapshot of the node rows. Sibling weight
//! and name uniqueness are checked against the snapshot on every write and
//! again against the shared rows at commit, so two transactions that both
//! claim the same slot surface a [`TreeError::Conflict`] on the later
//! commit. Row locks are not modelled; commit-time validation is what
//! serializes writers here. Commit also walks the ancestor chain of every
//! rewritten row, so two crossing moves that would close a loop leave the
//! later one with a conflict to retry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::tree::error::TreeError;
use crate::tree::store::{Actor, NewNode, NodeStore, NodeTx, SiblingKey, TreeNode};
use crate::types::{DbId, SortWeight, ROOT_PARENT_ID};

#[derive(Debug, Clone)]
struct MemoryCategory {
    name: String,
    updated_by: Option<Actor>,
}

#[derive(Debug, Default)]
struct State {
    categories: HashMap<DbId, MemoryCategory>,
    nodes: BTreeMap<DbId, TreeNode>,
    next_category_id: DbId,
    next_node_id: DbId,
    failing_commits: u32,
}

/// Shared in-memory node rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    interleave: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose reads yield to the scheduler, so concurrent
    /// operations interleave between reading siblings and writing.
    pub fn interleaving() -> Self {
        Self {
            interleave: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Register a tree and return its id.
    pub fn add_category(&self, name: &str) -> DbId {
        let mut state = self.lock();
        state.next_category_id += 1;
        let id = state.next_category_id;
        state.categories.insert(
            id,
            MemoryCategory {
                name: name.to_string(),
                updated_by: None,
            },
        );
        id
    }

    /// Insert a node with an explicit weight, bypassing placement.
    pub fn seed_node(
        &self,
        category_id: DbId,
        parent_id: DbId,
        name: &str,
        sort_weight: SortWeight,
    ) -> TreeNode {
        let mut state = self.lock();
        state.next_node_id += 1;
        let node = TreeNode {
            id: state.next_node_id,
            category_id,
            parent_id,
            name: name.to_string(),
            owner_id: None,
            owner_name: None,
            required: false,
            selected: false,
            sort_weight,
        };
        state.nodes.insert(node.id, node.clone());
        node
    }

    /// Committed node by id.
    pub fn node(&self, id: DbId) -> Option<TreeNode> {
        self.lock().nodes.get(&id).cloned()
    }

    /// Committed children of `parent_id`, ascending by weight.
    pub fn children(&self, category_id: DbId, parent_id: DbId) -> Vec<TreeNode> {
        let state = self.lock();
        let mut children: Vec<TreeNode> = state
            .nodes
            .values()
            .filter(|n| n.category_id == category_id && n.parent_id == parent_id)
            .cloned()
            .collect();
        children.sort_by_key(|n| n.sort_weight);
        children
    }

    /// Number of committed nodes in a tree.
    pub fn node_count(&self, category_id: DbId) -> usize {
        self.lock()
            .nodes
            .values()
            .filter(|n| n.category_id == category_id)
            .count()
    }

    /// Last actor stamped on a tree, if any.
    pub fn category_updated_by(&self, category_id: DbId) -> Option<Actor> {
        self.lock()
            .categories
            .get(&category_id)
            .and_then(|c| c.updated_by.clone())
    }

    /// Name a tree was registered with.
    pub fn category_name(&self, category_id: DbId) -> Option<String> {
        self.lock()
            .categories
            .get(&category_id)
            .map(|c| c.name.clone())
    }

    /// Make the next `count` commits fail with a conflict.
    pub fn fail_next_commits(&self, count: u32) {
        self.lock().failing_commits = count;
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panic while holding the lock cannot leave rows half-written: every
    // mutation is a single map operation.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl NodeStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, TreeError> {
        let nodes = self.lock().nodes.clone();
        Ok(MemoryTx {
            state: Arc::clone(&self.state),
            interleave: self.interleave,
            nodes,
            written: BTreeSet::new(),
            inserted: BTreeSet::new(),
            deleted: BTreeSet::new(),
            touched: Vec::new(),
        })
    }
}

/// One snapshot transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    state: Arc<Mutex<State>>,
    interleave: bool,
    nodes: BTreeMap<DbId, TreeNode>,
    written: BTreeSet<DbId>,
    inserted: BTreeSet<DbId>,
    deleted: BTreeSet<DbId>,
    touched: Vec<(DbId, Actor)>,
}

impl MemoryTx {
    async fn pause(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }

    fn siblings(&self, category_id: DbId, parent_id: DbId) -> impl Iterator<Item = &TreeNode> {
        self.nodes
            .values()
            .filter(move |n| n.category_id == category_id && n.parent_id == parent_id)
    }

    /// Reject a row whose slot or name is held by another sibling.
    fn check_unique(&self, row: &TreeNode) -> Result<(), TreeError> {
        check_unique_in(&self.nodes, row)
    }

    fn node_mut(&mut self, category_id: DbId, node_id: DbId) -> Result<&mut TreeNode, TreeError> {
        self.nodes
            .get_mut(&node_id)
            .filter(|n| n.category_id == category_id)
            .ok_or(TreeError::NotFound {
                entity: "CategoryNode",
                id: node_id,
            })
    }

    fn rewrite(&mut self, row: TreeNode) -> Result<(), TreeError> {
        self.check_unique(&row)?;
        self.written.insert(row.id);
        self.nodes.insert(row.id, row);
        Ok(())
    }
}

fn check_unique_in(nodes: &BTreeMap<DbId, TreeNode>, row: &TreeNode) -> Result<(), TreeError> {
    for other in nodes.values() {
        if other.id == row.id
            || other.category_id != row.category_id
            || other.parent_id != row.parent_id
        {
            continue;
        }
        if other.sort_weight == row.sort_weight {
            return Err(TreeError::Conflict {
                detail: format!(
                    "weight {} under parent {} is held by node {}",
                    row.sort_weight, row.parent_id, other.id
                ),
            });
        }
        if other.name == row.name {
            return Err(TreeError::NameConflict {
                name: row.name.clone(),
            });
        }
    }
    Ok(())
}

/// Reject a row whose parent chain loops back to it or never reaches the
/// root within the number of stored rows.
fn check_acyclic_in(nodes: &BTreeMap<DbId, TreeNode>, id: DbId) -> Result<(), TreeError> {
    let Some(row) = nodes.get(&id) else {
        return Ok(());
    };
    let mut current = row.parent_id;
    for _ in 0..=nodes.len() {
        if current == ROOT_PARENT_ID {
            return Ok(());
        }
        if current == id {
            break;
        }
        match nodes.get(&current) {
            Some(parent) => current = parent.parent_id,
            None => return Ok(()),
        }
    }
    Err(TreeError::Conflict {
        detail: format!("node {id} would become its own ancestor"),
    })
}

fn key(node: &TreeNode) -> SiblingKey {
    SiblingKey {
        id: node.id,
        sort_weight: node.sort_weight,
    }
}

#[async_trait]
impl NodeTx for MemoryTx {
    async fn category_exists(&mut self, category_id: DbId) -> Result<bool, TreeError> {
        Ok(lock_state(&self.state).categories.contains_key(&category_id))
    }

    async fn find_node(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<TreeNode>, TreeError> {
        self.pause().await;
        Ok(self
            .nodes
            .get(&node_id)
            .filter(|n| n.category_id == category_id)
            .cloned())
    }

    async fn min_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError> {
        self.pause().await;
        Ok(self
            .siblings(category_id, parent_id)
            .min_by_key(|n| n.sort_weight)
            .map(key))
    }

    async fn max_sibling_weight(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<SiblingKey>, TreeError> {
        self.pause().await;
        Ok(self
            .siblings(category_id, parent_id)
            .max_by_key(|n| n.sort_weight)
            .map(key))
    }

    async fn sibling_below(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
        weight: SortWeight,
    ) -> Result<Option<SiblingKey>, TreeError> {
        self.pause().await;
        Ok(self
            .siblings(category_id, parent_id)
            .filter(|n| n.sort_weight < weight)
            .max_by_key(|n| n.sort_weight)
            .map(key))
    }

    async fn siblings_ordered_asc_locked(
        &mut self,
        category_id: DbId,
        parent_id: DbId,
    ) -> Result<Vec<SiblingKey>, TreeError> {
        self.pause().await;
        let mut keys: Vec<SiblingKey> = self.siblings(category_id, parent_id).map(key).collect();
        keys.sort_by_key(|k| k.sort_weight);
        Ok(keys)
    }

    async fn parent_of(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, TreeError> {
        Ok(self
            .nodes
            .get(&node_id)
            .filter(|n| n.category_id == category_id)
            .map(|n| n.parent_id))
    }

    async fn lock_parent_of(
        &mut self,
        category_id: DbId,
        node_id: DbId,
    ) -> Result<Option<DbId>, TreeError> {
        self.pause().await;
        self.parent_of(category_id, node_id).await
    }

    async fn child_ids(
        &mut self,
        category_id: DbId,
        parent_ids: &[DbId],
    ) -> Result<Vec<DbId>, TreeError> {
        let parents: BTreeSet<DbId> = parent_ids.iter().copied().collect();
        Ok(self
            .nodes
            .values()
            .filter(|n| n.category_id == category_id && parents.contains(&n.parent_id))
            .map(|n| n.id)
            .collect())
    }

    async fn insert(
        &mut self,
        category_id: DbId,
        node: &NewNode,
        sort_weight: SortWeight,
        _actor: &Actor,
    ) -> Result<TreeNode, TreeError> {
        let id = {
            let mut state = lock_state(&self.state);
            state.next_node_id += 1;
            state.next_node_id
        };
        let row = TreeNode {
            id,
            category_id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            owner_id: node.owner_id,
            owner_name: node.owner_name.clone(),
            required: node.required,
            selected: node.selected,
            sort_weight,
        };
        self.rewrite(row.clone())?;
        self.inserted.insert(id);
        Ok(row)
    }

    async fn update_weight_and_parent(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        parent_id: DbId,
        sort_weight: SortWeight,
        _actor: &Actor,
    ) -> Result<(), TreeError> {
        let mut row = self.node_mut(category_id, node_id)?.clone();
        row.parent_id = parent_id;
        row.sort_weight = sort_weight;
        self.rewrite(row)
    }

    async fn update_weight(
        &mut self,
        category_id: DbId,
        node_id: DbId,
        sort_weight: SortWeight,
    ) -> Result<(), TreeError> {
        let mut row = self.node_mut(category_id, node_id)?.clone();
        row.sort_weight = sort_weight;
        self.rewrite(row)
    }

    async fn delete_by_ids(&mut self, category_id: DbId, ids: &[DbId]) -> Result<u64, TreeError> {
        let mut removed = 0;
        for id in ids {
            if self.nodes.get(id).is_some_and(|n| n.category_id == category_id) {
                self.nodes.remove(id);
                self.written.remove(id);
                self.deleted.insert(*id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn touch_category(&mut self, category_id: DbId, actor: &Actor) -> Result<(), TreeError> {
        self.touched.push((category_id, actor.clone()));
        Ok(())
    }

    async fn commit(self) -> Result<(), TreeError> {
        let mut state = lock_state(&self.state);
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(TreeError::Conflict {
                detail: "injected commit failure".to_string(),
            });
        }

        let mut next = state.nodes.clone();
        for id in &self.deleted {
            next.remove(id);
        }
        for id in &self.written {
            if !next.contains_key(id) && !self.inserted.contains(id) {
                return Err(TreeError::Conflict {
                    detail: format!("node {id} was removed by a concurrent writer"),
                });
            }
            if let Some(row) = self.nodes.get(id) {
                next.insert(*id, row.clone());
            }
        }
        for id in &self.written {
            if let Some(row) = next.get(id) {
                check_unique_in(&next, row)?;
            }
        }
        for id in &self.written {
            check_acyclic_in(&next, *id)?;
        }

        state.nodes = next;
        for (category_id, actor) in self.touched {
            if let Some(category) = state.categories.get_mut(&category_id) {
                category.updated_by = Some(actor);
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), TreeError> {
        Ok(())
    }
}
