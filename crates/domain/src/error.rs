//! Domain error types.

use common::{MealId, MenuId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A request value failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The cart would hold more meals than one box.
    #[error("Cart limit exceeded: {requested} meals requested, limit is {limit}")]
    LimitExceeded { requested: i32, limit: i32 },

    /// A uniqueness or reference constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller does not own the entity.
    #[error("Not authorized to access {entity} {id}")]
    Unauthorized { entity: &'static str, id: i64 },

    /// The meal is still listed on a weekly menu.
    #[error("Meal {0} is used in a weekly menu")]
    MealInUse(MealId),

    /// The active menu cannot be deleted.
    #[error("Menu {0} is active and cannot be deleted")]
    ActiveMenuDeletion(MenuId),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(constraint) => DomainError::Conflict(constraint),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
