//! Error taxonomy for the ordering engine.

use crate::error::CoreError;
use crate::types::DbId;

/// Boxed source error raised by a storage backend.
pub type StorageSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised while placing, moving, or deleting category nodes.
///
/// Only [`TreeError::Conflict`] is transient. [`TreeError::ReorderRequired`]
/// never leaves the engine: placement resolves it by rebalancing in the
/// same transaction.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A concurrent writer claimed the same sibling weight.
    #[error("Sort weight conflict: {detail}")]
    Conflict { detail: String },

    /// No integer is left between the two neighbours of the target slot.
    #[error("No free sort weight between neighbours, siblings need rebalancing")]
    ReorderRequired,

    /// The operation would place a node below the layer limit.
    #[error("Depth {depth} exceeds the maximum of {max_layer} layers")]
    DepthOverflow { depth: i64, max_layer: i64 },

    /// The destination parent is the moved node or one of its descendants.
    #[error("Cannot move node {node_id} under its own descendant {parent_id}")]
    Cycle { node_id: DbId, parent_id: DbId },

    /// Rebalancing ran out of order space below the parent.
    #[error("Sort weight space exhausted under parent {parent_id}")]
    CapacityExhausted { parent_id: DbId },

    /// A sibling with the same name already exists.
    #[error("A node named '{name}' already exists under this parent")]
    NameConflict { name: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested position does not exist under the destination parent.
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Every attempt ended in a transient conflict.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<TreeError> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageSource),
}

impl TreeError {
    /// Whether retrying in a fresh transaction can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TreeError::Conflict { .. })
    }

    /// Wrap any backend error as [`TreeError::Storage`].
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TreeError::Storage(Box::new(err))
    }
}

impl From<CoreError> for TreeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => TreeError::NotFound { entity, id },
            CoreError::Validation(msg) => TreeError::Validation(msg),
            CoreError::Conflict(detail) => TreeError::Conflict { detail },
            CoreError::Internal(msg) => TreeError::Internal(msg),
        }
    }
}
