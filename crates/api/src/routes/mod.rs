pub mod categories;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /categories                                      list, create
/// /categories/{id}                                 get, update, delete
/// /categories/{id}/in-use                          set in-use flag (PUT)
/// /categories/{id}/tree                            nested ordered view (GET)
/// /categories/{id}/nodes                           list children, create node
/// /categories/{id}/nodes/{node_id}                 get, rename, delete subtree
/// /categories/{id}/nodes/{node_id}/move            move (PUT)
/// /categories/{id}/nodes/{node_id}/rebalance       respace children (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/categories", categories::router())
}
