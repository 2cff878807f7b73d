use axum::extract::State;
use axum::{routing::get, Json, Router};
use catalog_core::tree::InsertPosition;
use serde::Serialize;

use crate::state::AppState;

/// Ordering engine settings the service is running with.
#[derive(Serialize)]
pub struct TreeSettings {
    pub max_layer: i64,
    pub insert_position: InsertPosition,
    pub max_attempts: u32,
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database does not answer.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    pub tree: TreeSettings,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match catalog_db::health_check(&state.pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let config = state.tree.config();
    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        tree: TreeSettings {
            max_layer: config.max_layer,
            insert_position: config.insert_position,
            max_attempts: config.retry.max_attempts,
        },
    })
}

/// Health routes, mounted at the root rather than under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
