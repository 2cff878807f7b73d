use std::sync::Arc;

use catalog_core::tree::CategoryTree;
use catalog_db::node_store::PgNodeStore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: catalog_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Ordering engine over the same pool.
    pub tree: Arc<CategoryTree<PgNodeStore>>,
    /// Cancelled on shutdown; tree operations stop retrying once it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pool: catalog_db::DbPool, config: ServerConfig) -> Self {
        let tree = CategoryTree::new(PgNodeStore::new(pool.clone()), config.tree.clone());
        Self {
            pool,
            config: Arc::new(config),
            tree: Arc::new(tree),
            shutdown: CancellationToken::new(),
        }
    }
}
