//! Relational persistence for the meal-prep backend.
//!
//! The [`Store`] trait family is implemented twice: [`PostgresStore`] for
//! production and [`InMemoryStore`] for tests and local runs. Both give the
//! same atomicity guarantees for stock decrements, menu activation, menu
//! replacement and the checkout commit, and both reject non-positive cart and
//! order quantities and stock decrements.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    Cart, CartItem, Meal, MenuDeletion, MenuEntry, MenuMeal, NewMeal, NewOrder, NewOrderLine,
    NewUser, Order, OrderItem, OrderStatus, Role, User, WeeklyMenu,
};
pub use store::{CartStore, MealStore, MenuStore, OrderStore, StockLedger, Store, UserStore};
