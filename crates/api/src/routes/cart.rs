//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, MealId, Money, UserId};
use domain::CartUpdate;
use serde::{Deserialize, Serialize};
use store::{Cart, CartItem, Meal, Store};

use super::MessageResponse;
use super::auth::CurrentUser;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub meal_id: MealId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub id: CartItemId,
    pub meal: Meal,
    pub quantity: i32,
    pub line_price: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id,
            meal: item.meal.clone(),
            quantity: item.quantity,
            line_price: item.line_price(),
            created_at: item.created_at,
        }
    }
}

/// Cart with the totals the client renders.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItemResponse>,
    pub total_items: i32,
    pub total_price: Money,
    pub updated_at: DateTime<Utc>,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            id: cart.id,
            user_id: cart.user_id,
            items: cart.items.iter().map(CartItemResponse::from).collect(),
            total_items: cart.total_items(),
            total_price: cart.total_price(),
            updated_at: cart.updated_at,
        }
    }
}

/// GET /api/cart
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_or_create(user_id).await?;
    Ok(Json(cart.into()))
}

/// POST /api/cart/items: merges into an existing line for the same meal.
#[tracing::instrument(skip(state))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .add_item(user_id, req.meal_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// PUT /api/cart/items/{id}: quantity zero removes the line.
#[tracing::instrument(skip(state))]
pub async fn update_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(item_id): Path<i64>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    let update = state
        .carts
        .update_item(user_id, CartItemId::new(item_id), req.quantity)
        .await?;

    Ok(match update {
        CartUpdate::Removed => MessageResponse::new("item removed from cart").into_response(),
        CartUpdate::Updated(cart) => Json(CartResponse::from(cart)).into_response(),
    })
}

/// DELETE /api/cart/items/{id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(item_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .carts
        .remove_item(user_id, CartItemId::new(item_id))
        .await?;
    Ok(MessageResponse::new("item removed from cart"))
}

/// DELETE /api/cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.carts.clear(user_id).await?;
    Ok(MessageResponse::new("cart cleared"))
}
