//! Shared identifiers and value types used across the meal-prep workspace.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, CartItemId, MealId, MenuId, OrderId, UserId};

/// Number of meals in one subscription box.
///
/// A cart may never hold more than this many meals in total, and a checkout
/// requires exactly this many.
pub const BOX_SIZE: i32 = 10;
