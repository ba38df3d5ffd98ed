//! Checkout pipeline for the meal-prep backend.
//!
//! Checkout turns a full cart into a persisted order:
//! 1. Validate the cart (non-empty, exactly one box)
//! 2. Resolve the active menu and the delivery date
//! 3. Pre-flight stock check per line
//! 4. Commit order, items, stock decrements and cart clear in one transaction
//! 5. Send the receipt on a detached task
//!
//! A commit that loses a stock race rolls back completely and is reported as
//! insufficient stock, even when the pre-flight check passed.

pub mod coordinator;
pub mod error;
pub mod receipt;
pub mod services;
pub mod steps;

pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
pub use receipt::Receipt;
pub use services::{
    Delivery, InMemoryNotifier, LogNotifier, NotificationError, Notifier,
};
