use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, CartItemId, MealId, MenuId, Money, OrderId, UserId};
use tokio::sync::RwLock;

use crate::{
    Cart, CartItem, Meal, MenuDeletion, MenuEntry, MenuMeal, NewMeal, NewOrder, NewUser, Order, OrderItem,
    OrderStatus, Result, StoreError, User, WeeklyMenu,
    store::{CartStore, MealStore, MenuStore, OrderStore, StockLedger, UserStore},
};

// Named like the schema's CHECK constraints so both stores report the same conflict.
const CART_QUANTITY_CHECK: &str = "positive_cart_quantity";
const ORDER_QUANTITY_CHECK: &str = "positive_order_quantity";

#[derive(Debug, Clone, Copy)]
struct MenuRow {
    week_start_date: NaiveDate,
    is_active: bool,
}

#[derive(Debug, Clone, Copy)]
struct StockRow {
    initial: i32,
    available: i32,
}

#[derive(Debug, Clone, Copy)]
struct CartRow {
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct CartItemRow {
    cart_id: CartId,
    meal_id: MealId,
    quantity: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct OrderRow {
    user_id: UserId,
    week_id: MenuId,
    status: OrderStatus,
    total_price: Money,
    delivery_date: NaiveDate,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct OrderItemRow {
    order_id: OrderId,
    meal_id: MealId,
    quantity: i32,
    price: Money,
}

/// Tables of the in-memory store. Every trait method takes the lock once, so
/// each call is one transaction.
#[derive(Debug, Default)]
struct Tables {
    meals: BTreeMap<MealId, Meal>,
    menus: BTreeMap<MenuId, MenuRow>,
    menu_meals: BTreeMap<(MenuId, MealId), StockRow>,
    carts: BTreeMap<CartId, CartRow>,
    cart_items: BTreeMap<CartItemId, CartItemRow>,
    orders: BTreeMap<OrderId, OrderRow>,
    order_items: Vec<OrderItemRow>,
    users: BTreeMap<UserId, User>,
    sequence: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn ensure_meals_exist(&self, entries: &[MenuEntry]) -> Result<()> {
        let mut seen = Vec::with_capacity(entries.len());
        for entry in entries {
            if !self.meals.contains_key(&entry.meal_id) {
                return Err(StoreError::Conflict(format!(
                    "menu_meals.meal_id references missing meal {}",
                    entry.meal_id
                )));
            }
            if seen.contains(&entry.meal_id) {
                return Err(StoreError::Conflict(format!(
                    "meal {} listed twice on one menu",
                    entry.meal_id
                )));
            }
            seen.push(entry.meal_id);
        }
        Ok(())
    }

    fn insert_menu_meals(&mut self, menu_id: MenuId, entries: &[MenuEntry]) {
        for entry in entries {
            self.menu_meals.insert(
                (menu_id, entry.meal_id),
                StockRow {
                    initial: entry.stock,
                    available: entry.stock,
                },
            );
        }
    }

    fn remove_menu_meals(&mut self, menu_id: MenuId) {
        self.menu_meals.retain(|(menu, _), _| *menu != menu_id);
    }

    fn menu(&self, id: MenuId) -> Option<WeeklyMenu> {
        let row = self.menus.get(&id)?;
        let meals = self
            .menu_meals
            .iter()
            .filter(|((menu, _), _)| *menu == id)
            .filter_map(|((menu_id, meal_id), stock)| {
                self.meals.get(meal_id).map(|meal| MenuMeal {
                    menu_id: *menu_id,
                    meal: meal.clone(),
                    initial_stock: stock.initial,
                    available_stock: stock.available,
                })
            })
            .collect();

        Some(WeeklyMenu {
            id,
            week_start_date: row.week_start_date,
            is_active: row.is_active,
            meals,
        })
    }

    fn cart(&self, id: CartId) -> Option<Cart> {
        let row = self.carts.get(&id)?;
        let items = self
            .cart_items
            .iter()
            .filter(|(_, item)| item.cart_id == id)
            .filter_map(|(item_id, item)| {
                self.meals.get(&item.meal_id).map(|meal| CartItem {
                    id: *item_id,
                    cart_id: id,
                    meal: meal.clone(),
                    quantity: item.quantity,
                    created_at: item.created_at,
                })
            })
            .collect();

        Some(Cart {
            id,
            user_id: row.user_id,
            items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn cart_id_for_user(&self, user_id: UserId) -> Option<CartId> {
        self.carts
            .iter()
            .find(|(_, row)| row.user_id == user_id)
            .map(|(id, _)| *id)
    }

    fn touch_cart(&mut self, cart_id: CartId) {
        if let Some(row) = self.carts.get_mut(&cart_id) {
            row.updated_at = Utc::now();
        }
    }

    fn order(&self, id: OrderId) -> Option<Order> {
        let row = self.orders.get(&id)?;
        let items = self
            .order_items
            .iter()
            .filter(|item| item.order_id == id)
            .filter_map(|item| {
                self.meals.get(&item.meal_id).map(|meal| OrderItem {
                    meal: meal.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
            })
            .collect();

        Some(Order {
            id,
            user_id: row.user_id,
            week_id: row.week_id,
            status: row.status,
            total_price: row.total_price,
            delivery_date: row.delivery_date,
            created_at: row.created_at,
            items,
        })
    }
}

/// In-memory store implementation for tests and local runs.
///
/// This implementation keeps every table behind one lock and provides the
/// same interface and atomicity as the PostgreSQL implementation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns how many menus are flagged active.
    pub async fn active_menu_count(&self) -> usize {
        self.tables
            .read()
            .await
            .menus
            .values()
            .filter(|row| row.is_active)
            .count()
    }
}

#[async_trait]
impl MealStore for InMemoryStore {
    async fn create_meal(&self, meal: NewMeal) -> Result<Meal> {
        let mut tables = self.tables.write().await;
        let id = MealId::new(tables.next_id());
        let meal = meal.with_id(id);
        tables.meals.insert(id, meal.clone());
        Ok(meal)
    }

    async fn get_meal(&self, id: MealId) -> Result<Option<Meal>> {
        Ok(self.tables.read().await.meals.get(&id).cloned())
    }

    async fn list_meals(&self) -> Result<Vec<Meal>> {
        Ok(self.tables.read().await.meals.values().cloned().collect())
    }

    async fn update_meal(&self, meal: Meal) -> Result<Option<Meal>> {
        let mut tables = self.tables.write().await;
        match tables.meals.get_mut(&meal.id) {
            Some(stored) => {
                *stored = meal.clone();
                Ok(Some(meal))
            }
            None => Ok(None),
        }
    }

    async fn delete_meal(&self, id: MealId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.meals.contains_key(&id) {
            return Ok(false);
        }
        if tables.menu_meals.keys().any(|(_, meal)| *meal == id) {
            return Err(StoreError::Conflict(format!(
                "meal {id} is referenced by menu_meals"
            )));
        }
        if tables.order_items.iter().any(|item| item.meal_id == id) {
            return Err(StoreError::Conflict(format!(
                "meal {id} is referenced by order_items"
            )));
        }

        tables.cart_items.retain(|_, item| item.meal_id != id);
        tables.meals.remove(&id);
        Ok(true)
    }

    async fn meal_on_any_menu(&self, id: MealId) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.menu_meals.keys().any(|(_, meal)| *meal == id))
    }
}

#[async_trait]
impl MenuStore for InMemoryStore {
    async fn create_menu(
        &self,
        week_start: NaiveDate,
        entries: &[MenuEntry],
    ) -> Result<WeeklyMenu> {
        let mut tables = self.tables.write().await;
        tables.ensure_meals_exist(entries)?;

        let id = MenuId::new(tables.next_id());
        tables.menus.insert(
            id,
            MenuRow {
                week_start_date: week_start,
                is_active: false,
            },
        );
        tables.insert_menu_meals(id, entries);

        tables
            .menu(id)
            .ok_or_else(|| StoreError::Decode(format!("menu {id} vanished after insert")))
    }

    async fn get_menu(&self, id: MenuId) -> Result<Option<WeeklyMenu>> {
        Ok(self.tables.read().await.menu(id))
    }

    async fn list_menus(&self) -> Result<Vec<WeeklyMenu>> {
        let tables = self.tables.read().await;
        let mut menus: Vec<WeeklyMenu> = tables
            .menus
            .iter()
            .map(|(id, row)| WeeklyMenu {
                id: *id,
                week_start_date: row.week_start_date,
                is_active: row.is_active,
                meals: Vec::new(),
            })
            .collect();
        menus.sort_by(|a, b| {
            b.week_start_date
                .cmp(&a.week_start_date)
                .then(b.id.cmp(&a.id))
        });
        Ok(menus)
    }

    async fn get_active_menu(&self) -> Result<Option<WeeklyMenu>> {
        let tables = self.tables.read().await;
        let active = tables
            .menus
            .iter()
            .find(|(_, row)| row.is_active)
            .map(|(id, _)| *id);
        Ok(active.and_then(|id| tables.menu(id)))
    }

    async fn activate_menu(&self, id: MenuId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.menus.contains_key(&id) {
            return Ok(false);
        }
        for (menu_id, row) in tables.menus.iter_mut() {
            row.is_active = *menu_id == id;
        }
        Ok(true)
    }

    async fn replace_menu(
        &self,
        id: MenuId,
        week_start: NaiveDate,
        entries: &[MenuEntry],
    ) -> Result<Option<WeeklyMenu>> {
        let mut tables = self.tables.write().await;
        if !tables.menus.contains_key(&id) {
            return Ok(None);
        }
        tables.ensure_meals_exist(entries)?;

        if let Some(row) = tables.menus.get_mut(&id) {
            row.week_start_date = week_start;
        }
        tables.remove_menu_meals(id);
        tables.insert_menu_meals(id, entries);

        Ok(tables.menu(id))
    }

    async fn delete_menu(&self, id: MenuId) -> Result<MenuDeletion> {
        let mut tables = self.tables.write().await;
        match tables.menus.get(&id) {
            None => return Ok(MenuDeletion::NotFound),
            Some(menu) if menu.is_active => return Ok(MenuDeletion::Active),
            Some(_) => {}
        }
        if tables.orders.values().any(|order| order.week_id == id) {
            return Err(StoreError::Conflict(format!(
                "menu {id} is referenced by orders"
            )));
        }

        tables.remove_menu_meals(id);
        tables.menus.remove(&id);
        Ok(MenuDeletion::Deleted)
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn get_stock(&self, menu_id: MenuId, meal_id: MealId) -> Result<Option<i32>> {
        let tables = self.tables.read().await;
        Ok(tables
            .menu_meals
            .get(&(menu_id, meal_id))
            .map(|stock| stock.available))
    }

    async fn decrement_stock(
        &self,
        menu_id: MenuId,
        meal_id: MealId,
        quantity: i32,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.menu_meals.get_mut(&(menu_id, meal_id)) {
            Some(stock) if quantity > 0 && stock.available >= quantity => {
                stock.available -= quantity;
                Ok(())
            }
            _ => {
                metrics::counter!("stock_decrement_conflicts_total").increment(1);
                Err(StoreError::InsufficientStock { menu_id, meal_id })
            }
        }
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cart_id_for_user(user_id)
            .and_then(|id| tables.cart(id)))
    }

    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        let mut tables = self.tables.write().await;
        let cart_id = match tables.cart_id_for_user(user_id) {
            Some(id) => id,
            None => {
                let id = CartId::new(tables.next_id());
                let now = Utc::now();
                tables.carts.insert(
                    id,
                    CartRow {
                        user_id,
                        created_at: now,
                        updated_at: now,
                    },
                );
                id
            }
        };

        tables
            .cart(cart_id)
            .ok_or_else(|| StoreError::Decode(format!("cart {cart_id} vanished after insert")))
    }

    async fn insert_cart_item(
        &self,
        cart_id: CartId,
        meal_id: MealId,
        quantity: i32,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.carts.contains_key(&cart_id) {
            return Err(StoreError::Conflict(format!(
                "cart_items.cart_id references missing cart {cart_id}"
            )));
        }
        if !tables.meals.contains_key(&meal_id) {
            return Err(StoreError::Conflict(format!(
                "cart_items.meal_id references missing meal {meal_id}"
            )));
        }
        if tables
            .cart_items
            .values()
            .any(|item| item.cart_id == cart_id && item.meal_id == meal_id)
        {
            return Err(StoreError::Conflict("unique_cart_meal".to_string()));
        }
        if quantity < 1 {
            return Err(StoreError::Conflict(CART_QUANTITY_CHECK.to_string()));
        }

        let id = CartItemId::new(tables.next_id());
        tables.cart_items.insert(
            id,
            CartItemRow {
                cart_id,
                meal_id,
                quantity,
                created_at: Utc::now(),
            },
        );
        tables.touch_cart(cart_id);
        Ok(())
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let updated = match tables.cart_items.get_mut(&item_id) {
            Some(item) if item.cart_id == cart_id => {
                if quantity < 1 {
                    return Err(StoreError::Conflict(CART_QUANTITY_CHECK.to_string()));
                }
                item.quantity = quantity;
                true
            }
            _ => false,
        };
        if updated {
            tables.touch_cart(cart_id);
        }
        Ok(updated)
    }

    async fn delete_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .cart_items
            .get(&item_id)
            .is_some_and(|item| item.cart_id == cart_id);
        if owned {
            tables.cart_items.remove(&item_id);
            tables.touch_cart(cart_id);
        }
        Ok(owned)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.cart_items.len();
        tables.cart_items.retain(|_, item| item.cart_id != cart_id);
        let removed = before - tables.cart_items.len();
        if removed > 0 {
            tables.touch_cart(cart_id);
        }
        Ok(removed as u64)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn commit_checkout(&self, order: NewOrder) -> Result<OrderId> {
        let mut tables = self.tables.write().await;

        if !tables.menus.contains_key(&order.menu_id) {
            return Err(StoreError::Conflict(format!(
                "orders.week_id references missing menu {}",
                order.menu_id
            )));
        }

        // Check every guard before touching anything so a failing line
        // leaves no partial effect behind.
        let mut requested: BTreeMap<MealId, i64> = BTreeMap::new();
        for line in &order.lines {
            if !tables.meals.contains_key(&line.meal_id) {
                return Err(StoreError::Conflict(format!(
                    "order_items.meal_id references missing meal {}",
                    line.meal_id
                )));
            }
            if line.quantity < 1 {
                return Err(StoreError::Conflict(ORDER_QUANTITY_CHECK.to_string()));
            }
            *requested.entry(line.meal_id).or_default() += i64::from(line.quantity);
        }
        for (meal_id, quantity) in &requested {
            let available = tables
                .menu_meals
                .get(&(order.menu_id, *meal_id))
                .map(|stock| stock.available);
            if !available.is_some_and(|available| i64::from(available) >= *quantity) {
                metrics::counter!("stock_decrement_conflicts_total").increment(1);
                return Err(StoreError::InsufficientStock {
                    menu_id: order.menu_id,
                    meal_id: *meal_id,
                });
            }
        }

        let order_id = OrderId::new(tables.next_id());
        tables.orders.insert(
            order_id,
            OrderRow {
                user_id: order.user_id,
                week_id: order.menu_id,
                status: OrderStatus::Pending,
                total_price: order.total_price,
                delivery_date: order.delivery_date,
                created_at: Utc::now(),
            },
        );
        for line in &order.lines {
            tables.order_items.push(OrderItemRow {
                order_id,
                meal_id: line.meal_id,
                quantity: line.quantity,
                price: line.price,
            });
            if let Some(stock) = tables.menu_meals.get_mut(&(order.menu_id, line.meal_id)) {
                stock.available -= line.quantity;
            }
        }
        tables
            .cart_items
            .retain(|_, item| item.cart_id != order.cart_id);
        tables.touch_cart(order.cart_id);

        Ok(order_id)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.order(id))
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|(_, row)| row.user_id == user_id)
            .filter_map(|(id, _)| tables.order(*id))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let id = UserId::new(tables.next_id());
        let user = User {
            id,
            email: user.email,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }
}
