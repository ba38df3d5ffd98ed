use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CartId, CartItemId, MealId, MenuId, OrderId, UserId};

use crate::{
    Cart, Meal, MenuDeletion, MenuEntry, NewMeal, NewOrder, NewUser, Order, Result, User, WeeklyMenu,
};

/// Catalog persistence.
#[async_trait]
pub trait MealStore: Send + Sync {
    /// Inserts a meal and returns it with its generated id.
    async fn create_meal(&self, meal: NewMeal) -> Result<Meal>;

    /// Retrieves a meal. Returns None if it doesn't exist.
    async fn get_meal(&self, id: MealId) -> Result<Option<Meal>>;

    /// Retrieves all meals ordered by id.
    async fn list_meals(&self) -> Result<Vec<Meal>>;

    /// Overwrites every field of an existing meal.
    ///
    /// Returns None if the meal doesn't exist.
    async fn update_meal(&self, meal: Meal) -> Result<Option<Meal>>;

    /// Deletes a meal and any cart lines holding it.
    ///
    /// Returns false if the meal doesn't exist. Fails with `Conflict` when
    /// menus or past orders still reference it.
    async fn delete_meal(&self, id: MealId) -> Result<bool>;

    /// Returns true if any menu, active or not, lists the meal.
    async fn meal_on_any_menu(&self, id: MealId) -> Result<bool>;
}

/// Weekly menu persistence.
///
/// Multi-row writes here are atomic: an observer sees either the state
/// before or the state after, never a mix.
#[async_trait]
pub trait MenuStore: Send + Sync {
    /// Creates an inactive menu and its rows with `available = initial`.
    async fn create_menu(&self, week_start: NaiveDate, entries: &[MenuEntry])
    -> Result<WeeklyMenu>;

    /// Retrieves a menu with its meals and stock.
    async fn get_menu(&self, id: MenuId) -> Result<Option<WeeklyMenu>>;

    /// Retrieves all menus without their meals, newest week first.
    async fn list_menus(&self) -> Result<Vec<WeeklyMenu>>;

    /// Retrieves the active menu with its meals and stock.
    async fn get_active_menu(&self) -> Result<Option<WeeklyMenu>>;

    /// Clears every active flag and sets the one on `id`, in one transaction.
    ///
    /// Returns false, leaving the previous active menu untouched, if the
    /// menu doesn't exist.
    async fn activate_menu(&self, id: MenuId) -> Result<bool>;

    /// Replaces the week and the whole meal set of a menu, resetting stock.
    ///
    /// Returns None if the menu doesn't exist.
    async fn replace_menu(
        &self,
        id: MenuId,
        week_start: NaiveDate,
        entries: &[MenuEntry],
    ) -> Result<Option<WeeklyMenu>>;

    /// Deletes an inactive menu and its rows.
    ///
    /// The active check and the delete happen in one transaction, so a menu
    /// activated concurrently is never removed.
    async fn delete_menu(&self, id: MenuId) -> Result<MenuDeletion>;
}

/// Per-(menu, meal) stock counters.
///
/// `decrement_stock` is the only way `available_stock` goes down; there is
/// deliberately no operation that writes an arbitrary stock value.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads the current available stock. None if the meal isn't on the menu.
    async fn get_stock(&self, menu_id: MenuId, meal_id: MealId) -> Result<Option<i32>>;

    /// Subtracts `quantity` if it is positive and at least that much is
    /// available.
    ///
    /// Evaluated by the store against the latest committed value, so
    /// concurrent callers can never drive stock negative. Fails with
    /// `InsufficientStock` when no row matched.
    async fn decrement_stock(&self, menu_id: MenuId, meal_id: MealId, quantity: i32)
    -> Result<()>;
}

/// Cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Retrieves a user's cart with its lines. None if none was created yet.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Retrieves a user's cart, inserting an empty one on first access.
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart>;

    /// Inserts a new line. Fails with `Conflict` if the meal already has one.
    async fn insert_cart_item(&self, cart_id: CartId, meal_id: MealId, quantity: i32)
    -> Result<()>;

    /// Sets a line's quantity. Returns false if the line isn't in `cart_id`.
    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<bool>;

    /// Deletes a line. Returns false if the line isn't in `cart_id`.
    async fn delete_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool>;

    /// Deletes every line of a cart, returning how many were removed.
    async fn clear_cart(&self, cart_id: CartId) -> Result<u64>;
}

/// Order history persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes an order in one transaction: the order row, one item per line
    /// with its price-at-purchase, the conditional stock decrement per line,
    /// and the emptying of the cart.
    ///
    /// If any decrement fails the whole transaction rolls back and
    /// `InsufficientStock` is returned; nothing is observable afterwards.
    async fn commit_checkout(&self, order: NewOrder) -> Result<OrderId>;

    /// Retrieves an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves a user's orders with their items, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `Conflict` if the e-mail is taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Retrieves a user. Returns None if it doesn't exist.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
}

/// Every store capability the services need, behind one bound.
pub trait Store:
    MealStore + MenuStore + StockLedger + CartStore + OrderStore + UserStore
{
}

impl<T> Store for T where
    T: MealStore + MenuStore + StockLedger + CartStore + OrderStore + UserStore
{
}
