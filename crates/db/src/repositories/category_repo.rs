//! Repository for the `categories` table.

use catalog_core::category::CATEGORY_TYPE_CUSTOM;
use catalog_core::tree::Actor;
use catalog_core::types::DbId;
use sqlx::PgPool;

use crate::models::category::{Category, CreateCategory, UpdateCategory};

/// Column list for categories queries.
const COLUMNS: &str = "id, name, category_type, in_use, required, description, \
    created_by_id, created_by_name, updated_by_id, updated_by_name, created_at, updated_at";

/// Result of a logical delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteOutcome {
    Deleted,
    NotFound,
    /// The tree is flagged in use and was left alone.
    InUse,
}

/// Provides CRUD operations for category trees. Logically deleted rows are
/// invisible to every read.
pub struct CategoryRepo;

impl CategoryRepo {
    /// List live trees, ordered by name ascending.
    pub async fn list(pool: &PgPool) -> Result<Vec<Category>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM categories WHERE deleted_at IS NULL ORDER BY name ASC"
        );
        sqlx::query_as::<_, Category>(&query).fetch_all(pool).await
    }

    /// Find a live tree by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Category>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM categories WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Create a new tree, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateCategory,
        actor: &Actor,
    ) -> Result<Category, sqlx::Error> {
        let query = format!(
            "INSERT INTO categories
                (name, category_type, required, description,
                 created_by_id, created_by_name, updated_by_id, updated_by_name)
             VALUES ($1, $2, $3, $4, $5, $6, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Category>(&query)
            .bind(&input.name)
            .bind(input.category_type.unwrap_or(CATEGORY_TYPE_CUSTOM))
            .bind(input.required)
            .bind(&input.description)
            .bind(actor.id)
            .bind(&actor.name)
            .fetch_one(pool)
            .await
    }

    /// Update a live tree by ID, returning the updated row.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateCategory,
        actor: &Actor,
    ) -> Result<Option<Category>, sqlx::Error> {
        let query = format!(
            "UPDATE categories SET
                name = COALESCE($2, name),
                required = COALESCE($3, required),
                description = COALESCE($4, description),
                updated_by_id = $5,
                updated_by_name = $6
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(input.required)
            .bind(&input.description)
            .bind(actor.id)
            .bind(&actor.name)
            .fetch_optional(pool)
            .await
    }

    /// Set or clear the in-use flag.
    pub async fn set_in_use(
        pool: &PgPool,
        id: DbId,
        in_use: bool,
        actor: &Actor,
    ) -> Result<Option<Category>, sqlx::Error> {
        let query = format!(
            "UPDATE categories SET in_use = $2, updated_by_id = $3, updated_by_name = $4
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .bind(in_use)
            .bind(actor.id)
            .bind(&actor.name)
            .fetch_optional(pool)
            .await
    }

    /// Logically delete a tree unless it is in use.
    ///
    /// The row is locked while the flag is checked, so a concurrent
    /// `set_in_use` cannot slip between the check and the delete.
    pub async fn soft_delete(
        pool: &PgPool,
        id: DbId,
        actor: &Actor,
    ) -> Result<SoftDeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let in_use: Option<bool> = sqlx::query_scalar(
            "SELECT in_use FROM categories WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match in_use {
            None => SoftDeleteOutcome::NotFound,
            Some(true) => SoftDeleteOutcome::InUse,
            Some(false) => {
                sqlx::query(
                    "UPDATE categories
                     SET deleted_at = NOW(), updated_by_id = $2, updated_by_name = $3
                     WHERE id = $1",
                )
                .bind(id)
                .bind(actor.id)
                .bind(&actor.name)
                .execute(&mut *tx)
                .await?;
                SoftDeleteOutcome::Deleted
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
