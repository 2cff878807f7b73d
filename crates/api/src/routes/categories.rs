//! Route definitions for category trees and their nodes.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{categories, category_nodes};
use crate::state::AppState;

/// Category routes mounted at `/categories`.
///
/// ```text
/// GET    /                                   -> list_categories
/// POST   /                                   -> create_category
/// GET    /{id}                               -> get_category
/// PUT    /{id}                               -> update_category
/// DELETE /{id}                               -> delete_category
/// PUT    /{id}/in-use                        -> set_in_use
/// GET    /{id}/tree                          -> get_tree
/// GET    /{id}/nodes                         -> list_nodes
/// POST   /{id}/nodes                         -> create_node
/// GET    /{id}/nodes/{node_id}               -> get_node
/// PATCH  /{id}/nodes/{node_id}               -> rename_node
/// DELETE /{id}/nodes/{node_id}               -> delete_node
/// PUT    /{id}/nodes/{node_id}/move          -> move_node
/// POST   /{id}/nodes/{node_id}/rebalance     -> rebalance_children
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/{id}",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route("/{id}/in-use", put(categories::set_in_use))
        .route("/{id}/tree", get(category_nodes::get_tree))
        .route(
            "/{id}/nodes",
            get(category_nodes::list_nodes).post(category_nodes::create_node),
        )
        .route(
            "/{id}/nodes/{node_id}",
            get(category_nodes::get_node)
                .patch(category_nodes::rename_node)
                .delete(category_nodes::delete_node),
        )
        .route("/{id}/nodes/{node_id}/move", put(category_nodes::move_node))
        .route(
            "/{id}/nodes/{node_id}/rebalance",
            post(category_nodes::rebalance_children),
        )
}
