use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CartId, CartItemId, MealId, MenuId, Money, OrderId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    Cart, CartItem, Meal, MenuDeletion, MenuEntry, MenuMeal, NewMeal, NewOrder, NewUser, Order, OrderItem,
    Result, Role, StoreError, User, WeeklyMenu,
    store::{CartStore, MealStore, MenuStore, OrderStore, StockLedger, UserStore},
};

/// Meal columns of `meals m`, aliased so they can sit next to other tables'
/// columns in a join.
macro_rules! meal_columns {
    () => {
        "m.id AS meal_id, m.name AS meal_name, m.description AS meal_description, \
         m.image_url AS meal_image_url, m.calories AS meal_calories, \
         m.protein AS meal_protein, m.carbs AS meal_carbs, m.fat AS meal_fat, \
         m.price AS meal_price"
    };
}

const DECREMENT_STOCK: &str = r#"
    UPDATE menu_meals
    SET available_stock = available_stock - $1
    WHERE menu_id = $2 AND meal_id = $3 AND $1 > 0 AND available_stock >= $1
"#;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_meal(row: &PgRow) -> Result<Meal> {
        Ok(Meal {
            id: MealId::new(row.try_get("meal_id")?),
            name: row.try_get("meal_name")?,
            description: row.try_get("meal_description")?,
            image_url: row.try_get("meal_image_url")?,
            calories: row.try_get("meal_calories")?,
            protein: row.try_get("meal_protein")?,
            carbs: row.try_get("meal_carbs")?,
            fat: row.try_get("meal_fat")?,
            price: Money::from_cents(row.try_get("meal_price")?),
        })
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            email: row.try_get("email")?,
            role: role.parse::<Role>()?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn load_menu<'e, E>(executor: E, id: MenuId) -> Result<Option<WeeklyMenu>>
    where
        E: sqlx::PgExecutor<'e> + Copy,
    {
        let Some(row) = sqlx::query(
            "SELECT id, week_start_date, is_active FROM weekly_menus WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(executor)
        .await?
        else {
            return Ok(None);
        };

        let meal_rows = sqlx::query(concat!(
            "SELECT mm.menu_id, mm.initial_stock, mm.available_stock, ",
            meal_columns!(),
            " FROM menu_meals mm JOIN meals m ON m.id = mm.meal_id",
            " WHERE mm.menu_id = $1 ORDER BY m.id"
        ))
        .bind(id.as_i64())
        .fetch_all(executor)
        .await?;

        let meals = meal_rows
            .iter()
            .map(|row| {
                Ok(MenuMeal {
                    menu_id: MenuId::new(row.try_get("menu_id")?),
                    meal: Self::row_to_meal(row)?,
                    initial_stock: row.try_get("initial_stock")?,
                    available_stock: row.try_get("available_stock")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(WeeklyMenu {
            id,
            week_start_date: row.try_get("week_start_date")?,
            is_active: row.try_get("is_active")?,
            meals,
        }))
    }

    async fn insert_menu_meals(
        tx: &mut Transaction<'_, Postgres>,
        menu_id: MenuId,
        entries: &[MenuEntry],
    ) -> Result<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO menu_meals (menu_id, meal_id, initial_stock, available_stock)
                VALUES ($1, $2, $3, $3)
                "#,
            )
            .bind(menu_id.as_i64())
            .bind(entry.meal_id.as_i64())
            .bind(entry.stock)
            .execute(&mut **tx)
            .await
            .map_err(map_constraint)?;
        }
        Ok(())
    }

    async fn load_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(concat!(
            "SELECT oi.order_id, oi.quantity, oi.price, ",
            meal_columns!(),
            " FROM order_items oi JOIN meals m ON m.id = oi.meal_id",
            " WHERE oi.order_id = ANY($1) ORDER BY oi.order_id, oi.position"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: i64 = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(OrderItem {
                meal: Self::row_to_meal(row)?,
                quantity: row.try_get("quantity")?,
                price: Money::from_cents(row.try_get("price")?),
            });
        }

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let status: String = row.try_get("status")?;
                Ok(Order {
                    id: OrderId::new(id),
                    user_id: UserId::new(row.try_get("user_id")?),
                    week_id: MenuId::new(row.try_get("week_id")?),
                    status: status.parse()?,
                    total_price: Money::from_cents(row.try_get("total_price")?),
                    delivery_date: row.try_get("delivery_date")?,
                    created_at: row.try_get("created_at")?,
                    items: items.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Maps unique, foreign-key and check violations to `Conflict`.
fn map_constraint(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation())
    {
        let name = db_err.constraint().unwrap_or_else(|| db_err.message());
        return StoreError::Conflict(name.to_string());
    }
    StoreError::Database(e)
}

#[async_trait]
impl MealStore for PostgresStore {
    async fn create_meal(&self, meal: NewMeal) -> Result<Meal> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO meals (name, description, image_url, calories, protein, carbs, fat, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&meal.name)
        .bind(&meal.description)
        .bind(&meal.image_url)
        .bind(meal.calories)
        .bind(meal.protein)
        .bind(meal.carbs)
        .bind(meal.fat)
        .bind(meal.price.cents())
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)?;

        Ok(meal.with_id(MealId::new(id)))
    }

    async fn get_meal(&self, id: MealId) -> Result<Option<Meal>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            meal_columns!(),
            " FROM meals m WHERE m.id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_meal).transpose()
    }

    async fn list_meals(&self) -> Result<Vec<Meal>> {
        let rows = sqlx::query(concat!("SELECT ", meal_columns!(), " FROM meals m ORDER BY m.id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_meal).collect()
    }

    async fn update_meal(&self, meal: Meal) -> Result<Option<Meal>> {
        let result = sqlx::query(
            r#"
            UPDATE meals
            SET name = $2, description = $3, image_url = $4, calories = $5,
                protein = $6, carbs = $7, fat = $8, price = $9, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(meal.id.as_i64())
        .bind(&meal.name)
        .bind(&meal.description)
        .bind(&meal.image_url)
        .bind(meal.calories)
        .bind(meal.protein)
        .bind(meal.carbs)
        .bind(meal.fat)
        .bind(meal.price.cents())
        .execute(&self.pool)
        .await
        .map_err(map_constraint)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(meal))
    }

    async fn delete_meal(&self, id: MealId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM meals WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(map_constraint)?;

        Ok(result.rows_affected() > 0)
    }

    async fn meal_on_any_menu(&self, id: MealId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_meals WHERE meal_id = $1")
            .bind(id.as_i64())
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }
}

#[async_trait]
impl MenuStore for PostgresStore {
    async fn create_menu(
        &self,
        week_start: NaiveDate,
        entries: &[MenuEntry],
    ) -> Result<WeeklyMenu> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO weekly_menus (week_start_date, is_active) VALUES ($1, FALSE) RETURNING id",
        )
        .bind(week_start)
        .fetch_one(&mut *tx)
        .await?;
        let menu_id = MenuId::new(id);

        Self::insert_menu_meals(&mut tx, menu_id, entries).await?;
        tx.commit().await?;

        Self::load_menu(&self.pool, menu_id)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("menu {menu_id} vanished after insert")))
    }

    async fn get_menu(&self, id: MenuId) -> Result<Option<WeeklyMenu>> {
        Self::load_menu(&self.pool, id).await
    }

    async fn list_menus(&self) -> Result<Vec<WeeklyMenu>> {
        let rows = sqlx::query(
            r#"
            SELECT id, week_start_date, is_active
            FROM weekly_menus
            ORDER BY week_start_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(WeeklyMenu {
                    id: MenuId::new(row.try_get("id")?),
                    week_start_date: row.try_get("week_start_date")?,
                    is_active: row.try_get("is_active")?,
                    meals: Vec::new(),
                })
            })
            .collect()
    }

    async fn get_active_menu(&self) -> Result<Option<WeeklyMenu>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM weekly_menus WHERE is_active LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        match id {
            Some(id) => Self::load_menu(&self.pool, MenuId::new(id)).await,
            None => Ok(None),
        }
    }

    async fn activate_menu(&self, id: MenuId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE weekly_menus SET is_active = FALSE WHERE is_active")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE weekly_menus SET is_active = TRUE WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(map_constraint)?;

        // Dropping the transaction rolls the deactivation back.
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn replace_menu(
        &self,
        id: MenuId,
        week_start: NaiveDate,
        entries: &[MenuEntry],
    ) -> Result<Option<WeeklyMenu>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE weekly_menus SET week_start_date = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(week_start)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM menu_meals WHERE menu_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        Self::insert_menu_meals(&mut tx, id, entries).await?;
        tx.commit().await?;

        Self::load_menu(&self.pool, id).await
    }

    async fn delete_menu(&self, id: MenuId) -> Result<MenuDeletion> {
        let mut tx = self.pool.begin().await?;

        // The row lock makes a concurrent activation of this menu wait for us.
        let is_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM weekly_menus WHERE id = $1 FOR UPDATE")
                .bind(id.as_i64())
                .fetch_optional(&mut *tx)
                .await?;
        match is_active {
            None => return Ok(MenuDeletion::NotFound),
            Some(true) => return Ok(MenuDeletion::Active),
            Some(false) => {}
        }

        sqlx::query("DELETE FROM menu_meals WHERE menu_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM weekly_menus WHERE id = $1 AND NOT is_active")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(map_constraint)?;

        tx.commit().await?;
        Ok(MenuDeletion::Deleted)
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn get_stock(&self, menu_id: MenuId, meal_id: MealId) -> Result<Option<i32>> {
        let stock: Option<i32> = sqlx::query_scalar(
            "SELECT available_stock FROM menu_meals WHERE menu_id = $1 AND meal_id = $2",
        )
        .bind(menu_id.as_i64())
        .bind(meal_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    async fn decrement_stock(
        &self,
        menu_id: MenuId,
        meal_id: MealId,
        quantity: i32,
    ) -> Result<()> {
        let result = sqlx::query(DECREMENT_STOCK)
            .bind(quantity)
            .bind(menu_id.as_i64())
            .bind(meal_id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            metrics::counter!("stock_decrement_conflicts_total").increment(1);
            return Err(StoreError::InsufficientStock { menu_id, meal_id });
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query(
            "SELECT id, user_id, created_at, updated_at FROM carts WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let cart_id = CartId::new(row.try_get("id")?);
        let item_rows = sqlx::query(concat!(
            "SELECT ci.id, ci.quantity, ci.created_at, ",
            meal_columns!(),
            " FROM cart_items ci JOIN meals m ON m.id = ci.meal_id",
            " WHERE ci.cart_id = $1 ORDER BY ci.id"
        ))
        .bind(cart_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .iter()
            .map(|item| {
                Ok(CartItem {
                    id: CartItemId::new(item.try_get("id")?),
                    cart_id,
                    meal: Self::row_to_meal(item)?,
                    quantity: item.try_get("quantity")?,
                    created_at: item.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            id: cart_id,
            user_id,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        // A concurrent first access loses the insert race and reads the winner.
        sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id.as_i64())
            .execute(&self.pool)
            .await?;

        self.get_cart(user_id)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("cart for user {user_id} vanished")))
    }

    async fn insert_cart_item(
        &self,
        cart_id: CartId,
        meal_id: MealId,
        quantity: i32,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO cart_items (cart_id, meal_id, quantity) VALUES ($1, $2, $3)")
            .bind(cart_id.as_i64())
            .bind(meal_id.as_i64())
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(map_constraint)?;
        touch_cart(&mut tx, cart_id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2")
                .bind(item_id.as_i64())
                .bind(cart_id.as_i64())
                .bind(quantity)
                .execute(&mut *tx)
                .await
                .map_err(map_constraint)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        touch_cart(&mut tx, cart_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id.as_i64())
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        touch_cart(&mut tx, cart_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;
        touch_cart(&mut tx, cart_id).await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

async fn touch_cart(tx: &mut Transaction<'_, Postgres>, cart_id: CartId) -> Result<()> {
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id.as_i64())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn commit_checkout(&self, order: NewOrder) -> Result<OrderId> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, week_id, status, total_price, delivery_date)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING id
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(order.menu_id.as_i64())
        .bind(order.total_price.cents())
        .bind(order.delivery_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint)?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, meal_id, quantity, price, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(line.meal_id.as_i64())
            .bind(line.quantity)
            .bind(line.price.cents())
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(map_constraint)?;

            let result = sqlx::query(DECREMENT_STOCK)
                .bind(line.quantity)
                .bind(order.menu_id.as_i64())
                .bind(line.meal_id.as_i64())
                .execute(&mut *tx)
                .await?;

            // Returning drops `tx`, which rolls back the order and any
            // decrement already applied.
            if result.rows_affected() == 0 {
                metrics::counter!("stock_decrement_conflicts_total").increment(1);
                return Err(StoreError::InsufficientStock {
                    menu_id: order.menu_id,
                    meal_id: line.meal_id,
                });
            }
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(order.cart_id.as_i64())
            .execute(&mut *tx)
            .await?;
        touch_cart(&mut tx, order.cart_id).await?;

        tx.commit().await?;
        Ok(OrderId::new(id))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, week_id, status, total_price, delivery_date, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.load_orders(rows).await?.into_iter().next())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, week_id, status, total_price, delivery_date, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        self.load_orders(rows).await
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, role)
            VALUES ($1, $2)
            RETURNING id, email, role, created_at
            "#,
        )
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)?;

        Self::row_to_user(&row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, role, created_at FROM users WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }
}
