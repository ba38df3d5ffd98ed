//! Integration tests for the checkout pipeline.
//!
//! These tests run full checkouts against the in-memory store, including
//! concurrent checkouts racing for the last units of a meal.

use std::sync::Arc;
use std::time::Duration;

use checkout::{CheckoutCoordinator, CheckoutError, InMemoryNotifier};
use chrono::NaiveDate;
use common::{MealId, MenuId, Money, UserId};
use domain::{CartService, MealPatch, MealService, UserService};
use store::{
    CartStore, InMemoryStore, MealStore, MenuEntry, MenuStore, NewMeal, OrderStore, Role,
    StockLedger,
};

const DELIVERY: &str = "2025-03-14";

struct Shop {
    store: InMemoryStore,
    notifier: InMemoryNotifier,
    coordinator: Arc<CheckoutCoordinator<InMemoryStore, InMemoryNotifier>>,
    carts: CartService<InMemoryStore>,
    users: UserService<InMemoryStore>,
}

impl Shop {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = InMemoryNotifier::new();
        Self {
            coordinator: Arc::new(CheckoutCoordinator::new(store.clone(), notifier.clone())),
            carts: CartService::new(store.clone()),
            users: UserService::new(store.clone()),
            notifier,
            store,
        }
    }

    async fn meal(&self, name: &str, cents: i64) -> MealId {
        self.store
            .create_meal(NewMeal {
                name: name.to_string(),
                price: Money::from_cents(cents),
                ..NewMeal::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn active_menu(&self, stock: &[(MealId, i32)]) -> MenuId {
        let entries: Vec<MenuEntry> = stock
            .iter()
            .map(|(meal_id, stock)| MenuEntry {
                meal_id: *meal_id,
                stock: *stock,
            })
            .collect();
        let menu = self
            .store
            .create_menu(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), &entries)
            .await
            .unwrap();
        self.store.activate_menu(menu.id).await.unwrap();
        menu.id
    }

    async fn customer(&self, email: &str) -> UserId {
        self.users.register(email, Role::Customer).await.unwrap().id
    }
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn full_box_becomes_a_pending_order() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        let curry = shop.meal("Curry", 900).await;
        let menu = shop.active_menu(&[(chili, 20), (curry, 20)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 6).await.unwrap();
        shop.carts.add_item(user, curry, 4).await.unwrap();

        let order = shop.coordinator.checkout(user, DELIVERY).await.unwrap();

        assert_eq!(order.user_id, user);
        assert_eq!(order.week_id, menu);
        assert_eq!(order.status.as_str(), "pending");
        assert_eq!(order.total_price, Money::from_cents(6 * 1200 + 4 * 900));
        assert_eq!(order.delivery_date.to_string(), DELIVERY);
        let lines: Vec<(MealId, i32)> = order.items.iter().map(|i| (i.meal.id, i.quantity)).collect();
        assert_eq!(lines, vec![(chili, 6), (curry, 4)]);

        assert_eq!(shop.store.get_stock(menu, chili).await.unwrap(), Some(14));
        assert_eq!(shop.store.get_stock(menu, curry).await.unwrap(), Some(16));
        assert!(shop.carts.get_or_create(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receipt_is_sent_to_the_account_address() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        shop.active_menu(&[(chili, 20)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 10).await.unwrap();

        let order = shop.coordinator.checkout(user, DELIVERY).await.unwrap();

        assert!(
            shop.notifier
                .wait_for_attempts(1, Duration::from_secs(2))
                .await
        );
        let deliveries = shop.notifier.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].recipient, "ana@example.com");
        assert_eq!(deliveries[0].order_id, order.id);
        assert!(deliveries[0].receipt.html.contains("Total: $120.00"));
    }

    #[tokio::test]
    async fn failing_notifier_does_not_fail_checkout() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        shop.active_menu(&[(chili, 20)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 10).await.unwrap();
        shop.notifier.set_fail(true).await;

        let order = shop.coordinator.checkout(user, DELIVERY).await.unwrap();

        assert!(
            shop.notifier
                .wait_for_attempts(1, Duration::from_secs(2))
                .await
        );
        assert!(shop.notifier.deliveries().await.is_empty());
        assert!(shop.store.get_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn order_keeps_price_paid_after_catalog_change() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        shop.active_menu(&[(chili, 20)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 10).await.unwrap();
        let order = shop.coordinator.checkout(user, DELIVERY).await.unwrap();

        MealService::new(shop.store.clone())
            .update(
                chili,
                MealPatch {
                    price: Some(Money::from_cents(1999)),
                    ..MealPatch::default()
                },
            )
            .await
            .unwrap();

        let reloaded = shop.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.items[0].price, Money::from_cents(1200));
        assert_eq!(reloaded.total_price, Money::from_cents(12000));
        assert_eq!(reloaded.items[0].meal.price, Money::from_cents(1999));
    }
}

mod rejections {
    use super::*;

    #[tokio::test]
    async fn nine_and_eleven_items_are_invalid_sizes() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        let menu = shop.active_menu(&[(chili, 50)]).await;
        let user = shop.customer("ana@example.com").await;

        shop.carts.add_item(user, chili, 9).await.unwrap();
        let nine = shop.coordinator.checkout(user, DELIVERY).await;
        assert!(matches!(
            nine,
            Err(CheckoutError::InvalidCartSize { found: 9 })
        ));

        // The cart service refuses an eleventh meal, so write it directly.
        let cart = shop.store.get_cart(user).await.unwrap().unwrap();
        shop.store
            .set_cart_item_quantity(cart.id, cart.items[0].id, 11)
            .await
            .unwrap();
        let eleven = shop.coordinator.checkout(user, DELIVERY).await;
        assert!(matches!(
            eleven,
            Err(CheckoutError::InvalidCartSize { found: 11 })
        ));

        assert_eq!(shop.store.get_stock(menu, chili).await.unwrap(), Some(50));
        assert_eq!(shop.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn stock_below_cart_quantity_writes_nothing() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        let menu = shop.active_menu(&[(chili, 5)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 10).await.unwrap();

        let result = shop.coordinator.checkout(user, DELIVERY).await;

        match result {
            Err(CheckoutError::InsufficientStock { meal_id, meal_name }) => {
                assert_eq!(meal_id, chili);
                assert_eq!(meal_name, "Chili");
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(shop.store.get_stock(menu, chili).await.unwrap(), Some(5));
        assert_eq!(shop.store.order_count().await, 0);
        assert_eq!(shop.carts.get_or_create(user).await.unwrap().total_items(), 10);
        assert_eq!(shop.notifier.attempts().await, 0);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_unit_goes_to_exactly_one_checkout() {
        let shop = Shop::new();
        let scarce = shop.meal("Chili", 1200).await;
        let plenty = shop.meal("Curry", 900).await;
        let menu = shop.active_menu(&[(scarce, 1), (plenty, 100)]).await;

        let first = shop.customer("ana@example.com").await;
        let second = shop.customer("ben@example.com").await;
        for user in [first, second] {
            shop.carts.add_item(user, scarce, 1).await.unwrap();
            shop.carts.add_item(user, plenty, 9).await.unwrap();
        }

        let a = {
            let coordinator = Arc::clone(&shop.coordinator);
            tokio::spawn(async move { coordinator.checkout(first, DELIVERY).await })
        };
        let b = {
            let coordinator = Arc::clone(&shop.coordinator);
            tokio::spawn(async move { coordinator.checkout(second, DELIVERY).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            failure,
            CheckoutError::InsufficientStock { meal_id, .. } if *meal_id == scarce
        ));

        assert_eq!(shop.store.get_stock(menu, scarce).await.unwrap(), Some(0));
        assert_eq!(shop.store.get_stock(menu, plenty).await.unwrap(), Some(91));
        assert_eq!(shop.store.order_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_checkouts_never_oversell() {
        let shop = Shop::new();
        let scarce = shop.meal("Chili", 1200).await;
        let plenty = shop.meal("Curry", 900).await;
        let menu = shop.active_menu(&[(scarce, 6), (plenty, 500)]).await;

        let mut users = Vec::new();
        for i in 0..12 {
            let user = shop.customer(&format!("user{i}@example.com")).await;
            shop.carts.add_item(user, scarce, 2).await.unwrap();
            shop.carts.add_item(user, plenty, 8).await.unwrap();
            users.push(user);
        }

        let handles: Vec<_> = users
            .into_iter()
            .map(|user| {
                let coordinator = Arc::clone(&shop.coordinator);
                tokio::spawn(async move { coordinator.checkout(user, DELIVERY).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(CheckoutError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected checkout error: {other}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(shop.store.get_stock(menu, scarce).await.unwrap(), Some(0));
        assert_eq!(
            shop.store.get_stock(menu, plenty).await.unwrap(),
            Some(500 - 3 * 8)
        );
        assert_eq!(shop.store.order_count().await, 3);
    }
}

mod commit_time_shortfall {
    use super::*;
    use async_trait::async_trait;
    use common::{CartId, CartItemId, OrderId};
    use store::{
        Cart, Meal, MenuDeletion, NewOrder, NewUser, Order, User, UserStore, WeeklyMenu,
    };

    /// Reports unlimited stock on reads so the pre-flight pass always
    /// succeeds and only the conditional decrement in the commit can refuse.
    #[derive(Clone)]
    struct StaleStockReads(InMemoryStore);

    #[async_trait]
    impl MealStore for StaleStockReads {
        async fn create_meal(&self, meal: NewMeal) -> store::Result<Meal> {
            self.0.create_meal(meal).await
        }
        async fn get_meal(&self, id: MealId) -> store::Result<Option<Meal>> {
            self.0.get_meal(id).await
        }
        async fn list_meals(&self) -> store::Result<Vec<Meal>> {
            self.0.list_meals().await
        }
        async fn update_meal(&self, meal: Meal) -> store::Result<Option<Meal>> {
            self.0.update_meal(meal).await
        }
        async fn delete_meal(&self, id: MealId) -> store::Result<bool> {
            self.0.delete_meal(id).await
        }
        async fn meal_on_any_menu(&self, id: MealId) -> store::Result<bool> {
            self.0.meal_on_any_menu(id).await
        }
    }

    #[async_trait]
    impl MenuStore for StaleStockReads {
        async fn create_menu(
            &self,
            week_start: NaiveDate,
            entries: &[MenuEntry],
        ) -> store::Result<WeeklyMenu> {
            self.0.create_menu(week_start, entries).await
        }
        async fn get_menu(&self, id: MenuId) -> store::Result<Option<WeeklyMenu>> {
            self.0.get_menu(id).await
        }
        async fn list_menus(&self) -> store::Result<Vec<WeeklyMenu>> {
            self.0.list_menus().await
        }
        async fn get_active_menu(&self) -> store::Result<Option<WeeklyMenu>> {
            self.0.get_active_menu().await
        }
        async fn activate_menu(&self, id: MenuId) -> store::Result<bool> {
            self.0.activate_menu(id).await
        }
        async fn replace_menu(
            &self,
            id: MenuId,
            week_start: NaiveDate,
            entries: &[MenuEntry],
        ) -> store::Result<Option<WeeklyMenu>> {
            self.0.replace_menu(id, week_start, entries).await
        }
        async fn delete_menu(&self, id: MenuId) -> store::Result<MenuDeletion> {
            self.0.delete_menu(id).await
        }
    }

    #[async_trait]
    impl StockLedger for StaleStockReads {
        async fn get_stock(&self, menu_id: MenuId, meal_id: MealId) -> store::Result<Option<i32>> {
            Ok(self.0.get_stock(menu_id, meal_id).await?.map(|_| i32::MAX))
        }
        async fn decrement_stock(
            &self,
            menu_id: MenuId,
            meal_id: MealId,
            quantity: i32,
        ) -> store::Result<()> {
            self.0.decrement_stock(menu_id, meal_id, quantity).await
        }
    }

    #[async_trait]
    impl CartStore for StaleStockReads {
        async fn get_cart(&self, user_id: UserId) -> store::Result<Option<Cart>> {
            self.0.get_cart(user_id).await
        }
        async fn get_or_create_cart(&self, user_id: UserId) -> store::Result<Cart> {
            self.0.get_or_create_cart(user_id).await
        }
        async fn insert_cart_item(
            &self,
            cart_id: CartId,
            meal_id: MealId,
            quantity: i32,
        ) -> store::Result<()> {
            self.0.insert_cart_item(cart_id, meal_id, quantity).await
        }
        async fn set_cart_item_quantity(
            &self,
            cart_id: CartId,
            item_id: CartItemId,
            quantity: i32,
        ) -> store::Result<bool> {
            self.0.set_cart_item_quantity(cart_id, item_id, quantity).await
        }
        async fn delete_cart_item(&self, cart_id: CartId, item_id: CartItemId) -> store::Result<bool> {
            self.0.delete_cart_item(cart_id, item_id).await
        }
        async fn clear_cart(&self, cart_id: CartId) -> store::Result<u64> {
            self.0.clear_cart(cart_id).await
        }
    }

    #[async_trait]
    impl OrderStore for StaleStockReads {
        async fn commit_checkout(&self, order: NewOrder) -> store::Result<OrderId> {
            self.0.commit_checkout(order).await
        }
        async fn get_order(&self, id: OrderId) -> store::Result<Option<Order>> {
            self.0.get_order(id).await
        }
        async fn list_orders_for_user(&self, user_id: UserId) -> store::Result<Vec<Order>> {
            self.0.list_orders_for_user(user_id).await
        }
    }

    #[async_trait]
    impl UserStore for StaleStockReads {
        async fn create_user(&self, user: NewUser) -> store::Result<User> {
            self.0.create_user(user).await
        }
        async fn get_user(&self, id: UserId) -> store::Result<Option<User>> {
            self.0.get_user(id).await
        }
    }

    #[tokio::test]
    async fn decrement_refused_after_preflight_passed_writes_nothing() {
        let shop = Shop::new();
        let chili = shop.meal("Chili", 1200).await;
        let menu = shop.active_menu(&[(chili, 5)]).await;
        let user = shop.customer("ana@example.com").await;
        shop.carts.add_item(user, chili, 10).await.unwrap();
        let coordinator = CheckoutCoordinator::new(
            StaleStockReads(shop.store.clone()),
            shop.notifier.clone(),
        );

        let result = coordinator.checkout(user, DELIVERY).await;

        match result {
            Err(CheckoutError::InsufficientStock { meal_id, meal_name }) => {
                assert_eq!(meal_id, chili);
                assert_eq!(meal_name, "Chili");
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(shop.store.get_stock(menu, chili).await.unwrap(), Some(5));
        assert_eq!(shop.store.order_count().await, 0);
        assert_eq!(shop.carts.get_or_create(user).await.unwrap().total_items(), 10);
        assert_eq!(shop.notifier.attempts().await, 0);
    }
}
