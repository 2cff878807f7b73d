//! Category tree model.

use catalog_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `categories` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: DbId,
    pub name: String,
    pub category_type: i16,
    pub in_use: bool,
    pub required: bool,
    pub description: Option<String>,
    pub created_by_id: Option<DbId>,
    pub created_by_name: Option<String>,
    pub updated_by_id: Option<DbId>,
    pub updated_by_name: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new category tree.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    /// Defaults to a custom tree when omitted.
    pub category_type: Option<i16>,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

/// DTO for updating a category tree. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub required: Option<bool>,
    pub description: Option<String>,
}
