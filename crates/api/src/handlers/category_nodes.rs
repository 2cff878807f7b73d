//! Handlers for nodes inside a category tree.
//!
//! Reads go straight to [`CategoryNodeRepo`]. Create, move, delete, and
//! rebalance run through the ordering engine, which keeps sibling weights
//! unique, rejects cycles and layer overflow, and retries on contention.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use catalog_core::category::validate_name;
use catalog_core::error::CoreError;
use catalog_core::tree::{CreateNode, MoveNode, NewNode, Position};
use catalog_core::types::{DbId, SortWeight};
use catalog_db::models::category_node::{CategoryTreeView, RenameCategoryNode};
use catalog_db::repositories::{CategoryNodeRepo, CategoryRepo};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::actor::RequestActor;
use crate::query::ParentParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Request body for `POST /categories/{id}/nodes`.
///
/// `before_id` is shorthand for `{"position": {"kind": "before", "sibling_id": ..}}`.
#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    #[serde(flatten)]
    pub node: NewNode,
    pub position: Option<Position>,
    pub before_id: Option<DbId>,
    pub max_layer: Option<i64>,
}

impl CreateNodeRequest {
    fn position(&self) -> AppResult<Option<Position>> {
        match (self.position, self.before_id) {
            (Some(_), Some(_)) => Err(AppError::BadRequest(
                "Specify either position or before_id, not both".into(),
            )),
            (position, None) => Ok(position),
            (None, Some(sibling_id)) => Ok(Some(Position::Before(sibling_id))),
        }
    }
}

/// Request body for `PUT /categories/{id}/nodes/{node_id}/move`.
#[derive(Debug, Deserialize)]
pub struct MoveNodeRequest {
    pub parent_id: DbId,
    /// Sibling to land before; omitted appends at the tail.
    pub before_id: Option<DbId>,
    pub max_layer: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteNodeResponse {
    pub removed: u64,
}

#[derive(Debug, Serialize)]
pub struct RebalanceResponse {
    pub lowest_weight: Option<SortWeight>,
}

async fn ensure_category(state: &AppState, id: DbId) -> AppResult<()> {
    CategoryRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Category",
            id,
        }))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/categories/{id}/tree
///
/// The whole tree as nested nodes, each level ordered by weight.
pub async fn get_tree(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_category(&state, id).await?;
    let rows = CategoryNodeRepo::list_by_category(&state.pool, id).await?;
    Ok(Json(DataResponse {
        data: CategoryTreeView::build(rows),
    }))
}

/// GET /api/v1/categories/{id}/nodes?parent_id=
pub async fn list_nodes(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<ParentParams>,
) -> AppResult<impl IntoResponse> {
    ensure_category(&state, id).await?;
    let nodes = CategoryNodeRepo::list_children(&state.pool, id, params.parent_id).await?;
    Ok(Json(DataResponse { data: nodes }))
}

/// GET /api/v1/categories/{id}/nodes/{node_id}
pub async fn get_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let node = CategoryNodeRepo::find_by_id(&state.pool, id, node_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "CategoryNode",
            id: node_id,
        }))?;
    Ok(Json(DataResponse { data: node }))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// POST /api/v1/categories/{id}/nodes
pub async fn create_node(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateNodeRequest>,
) -> AppResult<impl IntoResponse> {
    let position = input.position()?;
    let request = CreateNode {
        category_id: id,
        node: input.node,
        position,
    };
    let node = state
        .tree
        .create_node(&request, input.max_layer, &actor, &state.shutdown)
        .await?;
    tracing::info!(
        category_id = id,
        node_id = node.id,
        user_id = actor.id,
        "Category node created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: node })))
}

/// PATCH /api/v1/categories/{id}/nodes/{node_id}
///
/// Rename only; position changes go through the move endpoint.
pub async fn rename_node(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(DbId, DbId)>,
    Json(input): Json<RenameCategoryNode>,
) -> AppResult<impl IntoResponse> {
    validate_name("Node", &input.name)?;
    let node = CategoryNodeRepo::rename(&state.pool, id, node_id, &input.name, &actor)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "CategoryNode",
            id: node_id,
        }))?;
    Ok(Json(DataResponse { data: node }))
}

/// PUT /api/v1/categories/{id}/nodes/{node_id}/move
pub async fn move_node(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(DbId, DbId)>,
    Json(input): Json<MoveNodeRequest>,
) -> AppResult<impl IntoResponse> {
    let request = MoveNode {
        category_id: id,
        node_id,
        parent_id: input.parent_id,
        before_id: input.before_id,
    };
    let outcome = state
        .tree
        .move_node(&request, input.max_layer, &actor, &state.shutdown)
        .await?;
    tracing::info!(
        category_id = id,
        node_id,
        parent_id = input.parent_id,
        user_id = actor.id,
        ?outcome,
        "Category node moved"
    );

    Ok(Json(DataResponse { data: outcome }))
}

/// DELETE /api/v1/categories/{id}/nodes/{node_id}
///
/// Removes the node and every descendant.
pub async fn delete_node(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path((id, node_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let removed = state
        .tree
        .delete_subtree(id, node_id, &actor, &state.shutdown)
        .await?;
    Ok(Json(DataResponse {
        data: DeleteNodeResponse { removed },
    }))
}

/// POST /api/v1/categories/{id}/nodes/{node_id}/rebalance
///
/// Respaces the children of `node_id`; `0` addresses the top level.
pub async fn rebalance_children(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path((id, parent_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let lowest_weight = state
        .tree
        .rebalance(id, parent_id, &actor, &state.shutdown)
        .await?;
    Ok(Json(DataResponse {
        data: RebalanceResponse { lowest_weight },
    }))
}
