//! Checkout error types.

use common::{BOX_SIZE, MealId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart does not hold exactly one box.
    #[error("Cart must contain exactly {expected} meals, found {found}", expected = BOX_SIZE)]
    InvalidCartSize { found: i32 },

    /// No menu is active.
    #[error("No active menu available")]
    NoActiveMenu,

    /// The delivery date is not `YYYY-MM-DD`.
    #[error("Invalid delivery date '{0}', use YYYY-MM-DD")]
    InvalidDate(String),

    /// A cart line holds a meal the active menu does not list.
    #[error("Meal {meal_name} is not on the active menu")]
    MealNotOnMenu { meal_id: MealId, meal_name: String },

    /// Not enough stock for a line, found either before or during commit.
    #[error("Insufficient stock for meal: {meal_name}")]
    InsufficientStock { meal_id: MealId, meal_name: String },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::InvalidCartSize { .. } => "invalid_cart_size",
            CheckoutError::NoActiveMenu => "no_active_menu",
            CheckoutError::InvalidDate(_) => "invalid_date",
            CheckoutError::MealNotOnMenu { .. } => "meal_not_on_menu",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::Domain(_) => "domain",
            CheckoutError::Store(_) => "store",
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
