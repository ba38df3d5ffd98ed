//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use common::{Money, UserId};
use sqlx::PgPool;
use store::{
    CartStore, MealStore, MenuDeletion, MenuEntry, MenuStore, NewMeal, NewOrder, NewOrderLine, NewUser,
    OrderStore, PostgresStore, Role, StockLedger, StoreError, UserStore, WeeklyMenu,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, cart_items, carts, menu_meals, weekly_menus, meals, users RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn new_meal(name: &str, price: i64) -> NewMeal {
    NewMeal {
        name: name.to_string(),
        price: Money::from_cents(price),
        ..NewMeal::default()
    }
}

async fn menu_with(store: &PostgresStore, entries: &[MenuEntry]) -> WeeklyMenu {
    store.create_menu(week(), entries).await.unwrap()
}

#[tokio::test]
async fn meal_crud_round_trip() {
    let store = get_test_store().await;

    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    assert_eq!(store.get_meal(meal.id).await.unwrap(), Some(meal.clone()));

    let mut renamed = meal.clone();
    renamed.name = "Beef Chili".to_string();
    store.update_meal(renamed.clone()).await.unwrap();
    assert_eq!(store.get_meal(meal.id).await.unwrap(), Some(renamed));

    assert!(store.delete_meal(meal.id).await.unwrap());
    assert!(store.get_meal(meal.id).await.unwrap().is_none());
    assert!(!store.delete_meal(meal.id).await.unwrap());
}

#[tokio::test]
async fn deleting_meal_on_menu_is_a_conflict() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    menu_with(
        &store,
        &[MenuEntry {
            meal_id: meal.id,
            stock: 5,
        }],
    )
    .await;

    assert!(store.meal_on_any_menu(meal.id).await.unwrap());
    let result = store.delete_meal(meal.id).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn menu_with_unknown_meal_is_rolled_back() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();

    let result = store
        .create_menu(
            week(),
            &[
                MenuEntry {
                    meal_id: meal.id,
                    stock: 5,
                },
                MenuEntry {
                    meal_id: common::MealId::new(9999),
                    stock: 5,
                },
            ],
        )
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert!(store.list_menus().await.unwrap().is_empty());
}

#[tokio::test]
async fn activation_keeps_a_single_active_menu() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let entries = [MenuEntry {
        meal_id: meal.id,
        stock: 5,
    }];
    let a = menu_with(&store, &entries).await;
    let b = menu_with(&store, &entries).await;

    assert!(store.activate_menu(a.id).await.unwrap());
    assert!(store.activate_menu(b.id).await.unwrap());
    assert!(!store.activate_menu(common::MenuId::new(9999)).await.unwrap());

    let active: Vec<_> = store
        .list_menus()
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.is_active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, b.id);
}

#[tokio::test]
async fn conditional_decrement_guards_stock() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let menu = menu_with(
        &store,
        &[MenuEntry {
            meal_id: meal.id,
            stock: 3,
        }],
    )
    .await;

    store.decrement_stock(menu.id, meal.id, 3).await.unwrap();
    let result = store.decrement_stock(menu.id, meal.id, 1).await;

    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
    assert_eq!(store.get_stock(menu.id, meal.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn non_positive_decrement_leaves_stock_alone() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let menu = menu_with(
        &store,
        &[MenuEntry {
            meal_id: meal.id,
            stock: 3,
        }],
    )
    .await;
    store.decrement_stock(menu.id, meal.id, 1).await.unwrap();

    for quantity in [0, -3] {
        let result = store.decrement_stock(menu.id, meal.id, quantity).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
    }
    assert_eq!(store.get_stock(menu.id, meal.id).await.unwrap(), Some(2));
}

#[tokio::test]
async fn active_menu_survives_deletion() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let entries = [MenuEntry {
        meal_id: meal.id,
        stock: 5,
    }];
    let active = menu_with(&store, &entries).await;
    let spare = menu_with(&store, &entries).await;
    store.activate_menu(active.id).await.unwrap();

    assert_eq!(
        store.delete_menu(active.id).await.unwrap(),
        MenuDeletion::Active
    );
    assert_eq!(
        store.get_active_menu().await.unwrap().map(|m| m.id),
        Some(active.id)
    );
    assert_eq!(
        store.delete_menu(spare.id).await.unwrap(),
        MenuDeletion::Deleted
    );
    assert_eq!(
        store.delete_menu(spare.id).await.unwrap(),
        MenuDeletion::NotFound
    );
}

#[tokio::test]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let menu = menu_with(
        &store,
        &[MenuEntry {
            meal_id: meal.id,
            stock: 4,
        }],
    )
    .await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.decrement_stock(menu.id, meal.id, 1).await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 4);
    assert_eq!(store.get_stock(menu.id, meal.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn cart_lines_keep_insertion_order() {
    let store = get_test_store().await;
    let user = UserId::new(1);
    let curry = store.create_meal(new_meal("Curry", 900)).await.unwrap();
    let chili = store.create_meal(new_meal("Chili", 1250)).await.unwrap();

    let cart = store.get_or_create_cart(user).await.unwrap();
    assert_eq!(store.get_or_create_cart(user).await.unwrap().id, cart.id);

    store.insert_cart_item(cart.id, chili.id, 2).await.unwrap();
    store.insert_cart_item(cart.id, curry.id, 3).await.unwrap();
    let duplicate = store.insert_cart_item(cart.id, chili.id, 1).await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let cart = store.get_cart(user).await.unwrap().unwrap();
    let names: Vec<_> = cart.items.iter().map(|i| i.meal.name.as_str()).collect();
    assert_eq!(names, ["Chili", "Curry"]);
    assert_eq!(cart.total_items(), 5);
    assert_eq!(cart.total_price(), Money::from_cents(2 * 1250 + 3 * 900));

    assert_eq!(store.clear_cart(cart.id).await.unwrap(), 2);
    assert!(store.get_cart(user).await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn cart_quantities_must_be_positive() {
    let store = get_test_store().await;
    let chili = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let curry = store.create_meal(new_meal("Curry", 900)).await.unwrap();
    let cart = store.get_or_create_cart(UserId::new(1)).await.unwrap();

    let zero = store.insert_cart_item(cart.id, chili.id, 0).await;
    assert!(matches!(zero, Err(StoreError::Conflict(ref c)) if c == "positive_cart_quantity"));

    store.insert_cart_item(cart.id, curry.id, 2).await.unwrap();
    let item = store.get_cart(UserId::new(1)).await.unwrap().unwrap().items[0].id;
    let negative = store.set_cart_item_quantity(cart.id, item, -1).await;
    assert!(matches!(negative, Err(StoreError::Conflict(ref c)) if c == "positive_cart_quantity"));
}

#[tokio::test]
async fn commit_checkout_is_all_or_nothing() {
    let store = get_test_store().await;
    let user = UserId::new(1);
    let plenty = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let scarce = store.create_meal(new_meal("Curry", 900)).await.unwrap();
    let menu = menu_with(
        &store,
        &[
            MenuEntry {
                meal_id: plenty.id,
                stock: 20,
            },
            MenuEntry {
                meal_id: scarce.id,
                stock: 1,
            },
        ],
    )
    .await;
    let cart = store.get_or_create_cart(user).await.unwrap();
    store.insert_cart_item(cart.id, plenty.id, 8).await.unwrap();
    store.insert_cart_item(cart.id, scarce.id, 2).await.unwrap();

    let result = store
        .commit_checkout(NewOrder {
            user_id: user,
            cart_id: cart.id,
            menu_id: menu.id,
            total_price: Money::from_cents(8 * 1250 + 2 * 900),
            delivery_date: week(),
            lines: vec![
                NewOrderLine {
                    meal_id: plenty.id,
                    quantity: 8,
                    price: plenty.price,
                },
                NewOrderLine {
                    meal_id: scarce.id,
                    quantity: 2,
                    price: scarce.price,
                },
            ],
        })
        .await;

    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
    assert!(store.list_orders_for_user(user).await.unwrap().is_empty());
    assert_eq!(store.get_stock(menu.id, plenty.id).await.unwrap(), Some(20));
    assert_eq!(store.get_cart(user).await.unwrap().unwrap().total_items(), 10);
}

#[tokio::test]
async fn committed_order_keeps_price_at_purchase() {
    let store = get_test_store().await;
    let user = UserId::new(1);
    let meal = store.create_meal(new_meal("Chili", 1250)).await.unwrap();
    let menu = menu_with(
        &store,
        &[MenuEntry {
            meal_id: meal.id,
            stock: 12,
        }],
    )
    .await;
    let cart = store.get_or_create_cart(user).await.unwrap();
    store.insert_cart_item(cart.id, meal.id, 10).await.unwrap();

    let order_id = store
        .commit_checkout(NewOrder {
            user_id: user,
            cart_id: cart.id,
            menu_id: menu.id,
            total_price: Money::from_cents(12500),
            delivery_date: week(),
            lines: vec![NewOrderLine {
                meal_id: meal.id,
                quantity: 10,
                price: meal.price,
            }],
        })
        .await
        .unwrap();

    let mut repriced = meal.clone();
    repriced.price = Money::from_cents(1500);
    store.update_meal(repriced).await.unwrap();

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.total_price, Money::from_cents(12500));
    assert_eq!(order.items[0].price, Money::from_cents(1250));
    assert_eq!(store.get_stock(menu.id, meal.id).await.unwrap(), Some(2));
    assert!(store.get_cart(user).await.unwrap().unwrap().is_empty());

    let deleted = store.delete_menu(menu.id).await;
    assert!(matches!(deleted, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let store = get_test_store().await;
    let user = NewUser {
        email: "a@example.com".to_string(),
        role: Role::Admin,
    };

    let created = store.create_user(user.clone()).await.unwrap();
    assert_eq!(created.role, Role::Admin);
    assert_eq!(store.get_user(created.id).await.unwrap(), Some(created));

    let result = store.create_user(user).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
}
