//! Acting-user extractor for mutating handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use catalog_core::tree::Actor;
use catalog_core::types::DbId;

use crate::error::AppError;

/// Header carrying the acting user's id, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the acting user's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The user a request acts on behalf of, stamped on every row it writes.
///
/// ```ignore
/// async fn my_handler(RequestActor(actor): RequestActor) -> AppResult<Json<()>> {
///     tracing::info!(user_id = actor.id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id: DbId = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(format!("Missing {USER_ID_HEADER} header")))?
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))?;

        let name = parts
            .headers
            .get(USER_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        Ok(RequestActor(Actor { id, name }))
    }
}
