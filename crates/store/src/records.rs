//! Rows as the store hands them out, with joined meal details where the
//! callers need them.

use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, CartItemId, MealId, MenuId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// A catalog meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub calories: i32,
    pub protein: i32,
    pub carbs: i32,
    pub fat: i32,
    pub price: Money,
}

/// Fields for a meal that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewMeal {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub calories: i32,
    #[serde(default)]
    pub protein: i32,
    #[serde(default)]
    pub carbs: i32,
    #[serde(default)]
    pub fat: i32,
    pub price: Money,
}

impl NewMeal {
    /// Attaches a generated id.
    pub fn with_id(self, id: MealId) -> Meal {
        Meal {
            id,
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            price: self.price,
        }
    }
}

/// One (meal, stock) entry used when creating or replacing a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub meal_id: MealId,
    pub stock: i32,
}

/// A weekly menu. `meals` is empty when the menu was loaded as a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyMenu {
    pub id: MenuId,
    pub week_start_date: NaiveDate,
    pub is_active: bool,
    pub meals: Vec<MenuMeal>,
}

impl WeeklyMenu {
    /// Returns the menu row for `meal_id`, if the meal is on this menu.
    pub fn meal(&self, meal_id: MealId) -> Option<&MenuMeal> {
        self.meals.iter().find(|m| m.meal.id == meal_id)
    }
}

/// Result of a menu deletion decided under the store's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuDeletion {
    Deleted,
    NotFound,
    /// The menu is the active one and was left in place.
    Active,
}

/// A meal on a menu together with its stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuMeal {
    pub menu_id: MenuId,
    pub meal: Meal,
    pub initial_stock: i32,
    pub available_stock: i32,
}

/// A user's cart with its lines in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Sum of all line quantities.
    pub fn total_items(&self) -> i32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of all line prices at the meals' current catalog prices.
    pub fn total_price(&self) -> Money {
        self.items.iter().map(CartItem::line_price).sum()
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finds a line by its id.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Finds the line holding `meal_id`.
    pub fn item_for_meal(&self, meal_id: MealId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.meal.id == meal_id)
    }
}

/// One cart line. Quantity is always at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub meal: Meal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    /// Meal price times quantity.
    pub fn line_price(&self) -> Money {
        self.meal.price.multiply(self.quantity)
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Newly checked out.
    #[default]
    Pending,
}

impl OrderStatus {
    /// Returns the status as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            other => Err(StoreError::Decode(format!("unknown order status '{other}'"))),
        }
    }
}

/// Everything the checkout commit writes in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    /// Cart emptied by the same transaction.
    pub cart_id: CartId,
    pub menu_id: MenuId,
    pub total_price: Money,
    pub delivery_date: NaiveDate,
    pub lines: Vec<NewOrderLine>,
}

/// One order line with the price copied at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    pub meal_id: MealId,
    pub quantity: i32,
    pub price: Money,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub week_id: MenuId,
    pub status: OrderStatus,
    pub total_price: Money,
    pub delivery_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// An order line. `price` is the price at purchase, never the current
/// catalog price of `meal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub meal: Meal,
    pub quantity: i32,
    pub price: Money,
}

impl OrderItem {
    /// Price at purchase times quantity.
    pub fn line_price(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// Returns the role as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(StoreError::Decode(format!("unknown role '{other}'"))),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields for a user that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
}
