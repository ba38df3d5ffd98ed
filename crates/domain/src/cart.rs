//! Cart aggregate.
//!
//! A user owns at most one cart, created on first access. The sum of all
//! line quantities never exceeds [`BOX_SIZE`]; every mutation checks the
//! total the cart would hold afterwards before writing anything.

use common::{BOX_SIZE, CartItemId, MealId, UserId};
use store::{Cart, CartStore, MealStore};

use crate::error::{DomainError, Result};

/// Outcome of setting a line's quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartUpdate {
    /// Quantity zero: the line was deleted.
    Removed,
    /// The line now holds the new quantity.
    Updated(Cart),
}

/// Checks that replacing `prior` units with `next` keeps the cart within
/// one box.
///
/// Client quantities can be anywhere in `i32`, so the sum is taken in `i64`.
fn ensure_within_limit(current_total: i32, prior: i32, next: i32) -> Result<()> {
    let requested = i64::from(current_total) - i64::from(prior) + i64::from(next);
    if requested > i64::from(BOX_SIZE) {
        return Err(DomainError::LimitExceeded {
            requested: i32::try_from(requested).unwrap_or(i32::MAX),
            limit: BOX_SIZE,
        });
    }
    Ok(())
}

fn record_mutation(op: &'static str) {
    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
}

/// Service for managing carts.
///
/// Mutations for one user are expected to arrive one at a time; the limit
/// check and the write are separate store calls.
#[derive(Debug, Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: CartStore + MealStore> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads the user's cart, creating an empty one on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.store.get_or_create_cart(user_id).await?)
    }

    /// Adds `quantity` units of a meal, merging with an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, user_id: UserId, meal_id: MealId, quantity: i32) -> Result<Cart> {
        if quantity < 1 {
            return Err(DomainError::InvalidInput(format!(
                "quantity must be at least 1, got {quantity}"
            )));
        }
        if self.store.get_meal(meal_id).await?.is_none() {
            return Err(DomainError::not_found("meal", meal_id));
        }

        let cart = self.store.get_or_create_cart(user_id).await?;
        ensure_within_limit(cart.total_items(), 0, quantity)?;

        match cart.item_for_meal(meal_id) {
            Some(existing) => {
                self.store
                    .set_cart_item_quantity(cart.id, existing.id, existing.quantity + quantity)
                    .await?;
            }
            None => {
                self.store
                    .insert_cart_item(cart.id, meal_id, quantity)
                    .await?;
            }
        }

        record_mutation("add");
        tracing::debug!(%user_id, %meal_id, quantity, "cart item added");
        self.reload(user_id).await
    }

    /// Sets a line's quantity. Zero deletes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartUpdate> {
        if quantity < 0 {
            return Err(DomainError::InvalidInput(format!(
                "quantity cannot be negative, got {quantity}"
            )));
        }

        let cart = self.owned_cart(user_id).await?;
        let item = cart
            .item(item_id)
            .ok_or_else(|| DomainError::not_found("cart item", item_id))?;

        if quantity == 0 {
            if !self.store.delete_cart_item(cart.id, item_id).await? {
                return Err(DomainError::not_found("cart item", item_id));
            }
            record_mutation("remove");
            return Ok(CartUpdate::Removed);
        }

        ensure_within_limit(cart.total_items(), item.quantity, quantity)?;
        if !self
            .store
            .set_cart_item_quantity(cart.id, item_id, quantity)
            .await?
        {
            return Err(DomainError::not_found("cart item", item_id));
        }

        record_mutation("update");
        self.reload(user_id).await.map(CartUpdate::Updated)
    }

    /// Deletes a line from the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        let cart = self.owned_cart(user_id).await?;
        if !self.store.delete_cart_item(cart.id, item_id).await? {
            return Err(DomainError::not_found("cart item", item_id));
        }

        record_mutation("remove");
        Ok(())
    }

    /// Deletes every line of the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        let cart = self.owned_cart(user_id).await?;
        self.store.clear_cart(cart.id).await?;

        record_mutation("clear");
        Ok(())
    }

    async fn owned_cart(&self, user_id: UserId) -> Result<Cart> {
        self.store
            .get_cart(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("cart for user", user_id))
    }

    async fn reload(&self, user_id: UserId) -> Result<Cart> {
        self.owned_cart(user_id).await
    }
}
