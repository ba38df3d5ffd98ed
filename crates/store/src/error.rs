use common::{MealId, MenuId};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
///
/// Absent rows are not errors: lookups return `Option` and deletes return
/// whether a row was found.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock decrement matched no row: either the pair is not
    /// on the menu or fewer units are available than requested.
    #[error("Insufficient stock for meal {meal_id} on menu {menu_id}")]
    InsufficientStock { menu_id: MenuId, meal_id: MealId },

    /// A uniqueness or referential constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// A stored value could not be mapped back to a domain value.
    #[error("Invalid stored value: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
