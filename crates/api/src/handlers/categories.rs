//! Handlers for category trees.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use catalog_core::category::{validate_category_type, validate_description, validate_name};
use catalog_core::error::CoreError;
use catalog_core::types::DbId;
use catalog_db::models::category::{CreateCategory, UpdateCategory};
use catalog_db::repositories::{CategoryRepo, SoftDeleteOutcome};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::actor::RequestActor;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `PUT /categories/{id}/in-use`.
#[derive(Debug, Deserialize)]
pub struct SetInUseRequest {
    pub in_use: bool,
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Category",
        id,
    })
}

/// GET /api/v1/categories
pub async fn list_categories(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let categories = CategoryRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: categories }))
}

/// POST /api/v1/categories
pub async fn create_category(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Json(input): Json<CreateCategory>,
) -> AppResult<impl IntoResponse> {
    validate_name("Category", &input.name)?;
    validate_description(input.description.as_deref())?;
    if let Some(category_type) = input.category_type {
        validate_category_type(category_type)?;
    }

    let category = CategoryRepo::create(&state.pool, &input, &actor).await?;
    tracing::info!(category_id = category.id, user_id = actor.id, "Category created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: category })))
}

/// GET /api/v1/categories/{id}
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let category = CategoryRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: category }))
}

/// PUT /api/v1/categories/{id}
pub async fn update_category(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateCategory>,
) -> AppResult<impl IntoResponse> {
    if let Some(name) = &input.name {
        validate_name("Category", name)?;
    }
    validate_description(input.description.as_deref())?;

    let category = CategoryRepo::update(&state.pool, id, &input, &actor)
        .await?
        .ok_or_else(|| not_found(id))?;
    tracing::info!(category_id = id, user_id = actor.id, "Category updated");

    Ok(Json(DataResponse { data: category }))
}

/// PUT /api/v1/categories/{id}/in-use
pub async fn set_in_use(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<SetInUseRequest>,
) -> AppResult<impl IntoResponse> {
    let category = CategoryRepo::set_in_use(&state.pool, id, input.in_use, &actor)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: category }))
}

/// DELETE /api/v1/categories/{id}
///
/// Logical delete; refused with 409 while the tree is flagged in use.
pub async fn delete_category(
    RequestActor(actor): RequestActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    match CategoryRepo::soft_delete(&state.pool, id, &actor).await? {
        SoftDeleteOutcome::Deleted => {
            tracing::info!(category_id = id, user_id = actor.id, "Category deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        SoftDeleteOutcome::NotFound => Err(not_found(id)),
        SoftDeleteOutcome::InUse => Err(AppError::Core(CoreError::Conflict(format!(
            "Category {id} is in use and cannot be deleted"
        )))),
    }
}
