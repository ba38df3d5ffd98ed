//! HTTP API server for the meal-prep backend.
//!
//! Exposes the catalog, weekly menus, carts and checkout over REST, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{CheckoutCoordinator, Notifier};
use domain::{CartService, MealService, MenuService, OrderService, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Notifier chosen at startup.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Shared application state.
pub struct AppState<S: Store> {
    pub meals: MealService<S>,
    pub menus: MenuService<S>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub users: UserService<S>,
    pub checkout: CheckoutCoordinator<S, SharedNotifier>,
}

impl<S: Store + Clone + 'static> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(store: S, notifier: SharedNotifier) -> Self {
        Self {
            meals: MealService::new(store.clone()),
            menus: MenuService::new(store.clone()),
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            users: UserService::new(store.clone()),
            checkout: CheckoutCoordinator::new(store, notifier),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{cart, meals, menus, orders, users};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/meals", get(meals::list::<S>).post(meals::create::<S>))
        .route(
            "/api/meals/{id}",
            get(meals::get::<S>)
                .patch(meals::update::<S>)
                .delete(meals::delete::<S>),
        )
        .route("/api/menu", get(menus::active::<S>))
        .route(
            "/api/admin/weekly-menus",
            get(menus::list::<S>).post(menus::create::<S>),
        )
        .route(
            "/api/admin/weekly-menus/{id}",
            get(menus::get::<S>)
                .put(menus::update::<S>)
                .delete(menus::delete::<S>),
        )
        .route(
            "/api/admin/weekly-menus/{id}/activate",
            put(menus::activate::<S>),
        )
        .route("/api/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/api/cart/items", post(cart::add_item::<S>))
        .route(
            "/api/cart/items/{id}",
            put(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route("/api/orders", get(orders::list::<S>))
        .route("/api/orders/checkout", post(orders::checkout::<S>))
        .route("/api/orders/{id}", get(orders::get::<S>))
        .route("/api/users", post(users::register::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
