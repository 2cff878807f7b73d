//! Position-maintenance engine for category trees.
//!
//! Nodes are flat rows linked by `parent_id`; siblings are ordered by a
//! sparse unsigned `sort_weight` that is unique within
//! `(category_id, parent_id)`. The submodules split the work:
//!
//! - [`weight`]: the bounded weight space and slot arithmetic
//! - [`store`]: the transactional row-access seam
//! - [`guard`]: cycle and layer-limit checks
//! - [`rebalance`]: respacing an exhausted sibling set
//! - [`placement`]: weights for head, tail, and before-sibling slots
//! - [`create`], [`mover`], [`delete`]: the mutating operations
//! - [`retry`]: bounded, cancellable transaction retry
//! - [`engine`]: [`CategoryTree`], the facade callers use

pub mod create;
pub mod delete;
pub mod engine;
pub mod error;
pub mod guard;
pub mod mover;
pub mod placement;
pub mod rebalance;
pub mod retry;
pub mod store;
pub mod weight;

pub use create::CreateNode;
pub use engine::{CategoryTree, InsertPosition, TreeConfig};
pub use error::TreeError;
pub use mover::{MoveNode, MoveOutcome};
pub use placement::Position;
pub use retry::RetryPolicy;
pub use store::{Actor, NewNode, NodeStore, NodeTx, SiblingKey, TreeNode};
