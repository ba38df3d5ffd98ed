//! Checkout step names, used in logs.

/// Step name: Load the cart and check its size.
pub const STEP_VALIDATE_CART: &str = "validate_cart";

/// Step name: Resolve the active menu.
pub const STEP_RESOLVE_MENU: &str = "resolve_menu";

/// Step name: Check stock for every line before writing.
pub const STEP_PREFLIGHT_STOCK: &str = "preflight_stock";

/// Step name: Write the order and decrement stock in one transaction.
pub const STEP_COMMIT: &str = "commit_order";

/// Step name: Hand the receipt to the notifier.
pub const STEP_NOTIFY: &str = "send_receipt";
