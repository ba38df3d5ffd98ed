//! Checkout coordinator turning a cart into an order.

use std::sync::Arc;

use common::{BOX_SIZE, UserId};
use domain::{CartService, MenuService, OrderService, UserService, parse_date};
use store::{Cart, NewOrder, NewOrderLine, Order, Store, StoreError, WeeklyMenu};

use crate::error::{CheckoutError, Result};
use crate::services::Notifier;
use crate::steps;

/// Orchestrates checkout for one user at a time.
///
/// Concurrent checkouts for the same meal are resolved by the store's
/// conditional stock decrement; the coordinator holds no locks of its own.
pub struct CheckoutCoordinator<S, N>
where
    S: Store,
    N: Notifier,
{
    store: S,
    carts: CartService<S>,
    menus: MenuService<S>,
    orders: OrderService<S>,
    users: UserService<S>,
    notifier: Arc<N>,
}

impl<S, N> CheckoutCoordinator<S, N>
where
    S: Store + Clone + 'static,
    N: Notifier + 'static,
{
    /// Creates a new checkout coordinator.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            menus: MenuService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            users: UserService::new(store.clone()),
            store,
            notifier: Arc::new(notifier),
        }
    }

    /// Checks out the user's cart for delivery on `delivery_date`
    /// (`YYYY-MM-DD`) and returns the persisted order.
    ///
    /// On any error nothing is written: the cart, stock and order history are
    /// exactly as before the call.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId, delivery_date: &str) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run(user_id, delivery_date).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    %user_id,
                    order_id = %order.id,
                    total = %order.total_price,
                    "checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_rejected_total", "reason" => e.reason()).increment(1);
                tracing::info!(%user_id, reason = e.reason(), error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn run(&self, user_id: UserId, delivery_date: &str) -> Result<Order> {
        // 1-2. Load the cart and check it holds exactly one box
        tracing::debug!(step = steps::STEP_VALIDATE_CART, "checkout step started");
        let cart = self.carts.get_or_create(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let found = cart.total_items();
        if found != BOX_SIZE {
            return Err(CheckoutError::InvalidCartSize { found });
        }

        // 3-4. Resolve the active menu and the delivery date
        tracing::debug!(step = steps::STEP_RESOLVE_MENU, "checkout step started");
        let menu = self
            .menus
            .get_active()
            .await?
            .ok_or(CheckoutError::NoActiveMenu)?;
        let delivery_date = parse_date(delivery_date)
            .ok_or_else(|| CheckoutError::InvalidDate(delivery_date.to_string()))?;

        // 5. Fail fast on lines the menu cannot cover
        tracing::debug!(step = steps::STEP_PREFLIGHT_STOCK, "checkout step started");
        self.preflight(&cart, &menu).await?;

        // 6-7. Order, items, decrements and cart clear in one transaction
        tracing::debug!(step = steps::STEP_COMMIT, "checkout step started");
        let order_id = self
            .store
            .commit_checkout(NewOrder {
                user_id,
                cart_id: cart.id,
                menu_id: menu.id,
                total_price: cart.total_price(),
                delivery_date,
                lines: cart
                    .items
                    .iter()
                    .map(|item| NewOrderLine {
                        meal_id: item.meal.id,
                        quantity: item.quantity,
                        price: item.meal.price,
                    })
                    .collect(),
            })
            .await
            .map_err(|e| match e {
                StoreError::InsufficientStock { meal_id, .. } => {
                    tracing::warn!(%meal_id, menu_id = %menu.id, "stock taken by a concurrent checkout");
                    CheckoutError::InsufficientStock {
                        meal_id,
                        meal_name: meal_name(&cart, meal_id),
                    }
                }
                other => CheckoutError::Store(other),
            })?;

        // 8. Reload with meal details
        let order = self.orders.get(user_id, order_id).await?;

        // 9. Receipt goes out on its own task
        self.dispatch_receipt(user_id, order.clone());
        Ok(order)
    }

    async fn preflight(&self, cart: &Cart, menu: &WeeklyMenu) -> Result<()> {
        for item in &cart.items {
            let available = self.store.get_stock(menu.id, item.meal.id).await?;
            match available {
                None => {
                    return Err(CheckoutError::MealNotOnMenu {
                        meal_id: item.meal.id,
                        meal_name: item.meal.name.clone(),
                    });
                }
                Some(available) if available < item.quantity => {
                    return Err(CheckoutError::InsufficientStock {
                        meal_id: item.meal.id,
                        meal_name: item.meal.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Looks up the recipient and sends the receipt without blocking the
    /// caller. Failures are logged and counted only.
    fn dispatch_receipt(&self, user_id: UserId, order: Order) {
        let users = self.users.clone();
        let notifier = Arc::clone(&self.notifier);

        tokio::spawn(async move {
            let order_id = order.id;
            let recipient = match users.get(user_id).await {
                Ok(Some(user)) => user.email,
                Ok(None) => {
                    tracing::warn!(%user_id, %order_id, "no account for user, receipt not sent");
                    return;
                }
                Err(e) => {
                    metrics::counter!("notification_failures_total").increment(1);
                    tracing::error!(%user_id, %order_id, error = %e, "recipient lookup failed");
                    return;
                }
            };

            tracing::debug!(step = steps::STEP_NOTIFY, %order_id, "checkout step started");
            if let Err(e) = notifier.send_order_receipt(&recipient, &order).await {
                metrics::counter!("notification_failures_total").increment(1);
                tracing::error!(%order_id, error = %e, "failed to send order receipt");
            }
        });
    }
}

fn meal_name(cart: &Cart, meal_id: common::MealId) -> String {
    cart.item_for_meal(meal_id)
        .map(|item| item.meal.name.clone())
        .unwrap_or_else(|| meal_id.to_string())
}
