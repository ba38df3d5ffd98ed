//! Domain layer for the meal-prep backend.
//!
//! This crate provides the services that sit between the HTTP surface and
//! the store:
//! - Cart aggregate with the box-size limit
//! - Weekly menu directory with single-active-menu activation
//! - Meal catalog with sparse patches
//! - Order history reads and user registration

pub mod cart;
pub mod catalog;
pub mod error;
pub mod menu;
pub mod orders;
pub mod users;

pub use cart::{CartService, CartUpdate};
pub use catalog::{MealPatch, MealService};
pub use error::{DomainError, Result};
pub use menu::{MenuService, parse_date};
pub use orders::OrderService;
pub use users::UserService;
