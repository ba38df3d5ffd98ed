//! Order history reads.

use common::{OrderId, UserId};
use store::{Order, OrderStore};

use crate::error::{DomainError, Result};

/// Read access to a user's orders.
#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        if order.user_id != user_id {
            tracing::warn!(%user_id, %order_id, "order requested by another user");
            return Err(DomainError::Unauthorized {
                entity: "order",
                id: order_id.as_i64(),
            });
        }
        Ok(order)
    }

    /// Lists the user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }
}
