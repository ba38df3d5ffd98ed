//! Meal catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::MealId;
use domain::MealPatch;
use store::{Meal, NewMeal, Store};

use super::MessageResponse;
use super::auth::AdminUser;
use crate::AppState;
use crate::error::ApiError;

/// GET /api/meals
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Meal>>, ApiError> {
    Ok(Json(state.meals.list().await?))
}

/// GET /api/meals/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Meal>, ApiError> {
    Ok(Json(state.meals.get(MealId::new(id)).await?))
}

/// POST /api/meals (admin)
#[tracing::instrument(skip(state, meal))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Json(meal): Json<NewMeal>,
) -> Result<(StatusCode, Json<Meal>), ApiError> {
    let meal = state.meals.create(meal).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

/// PATCH /api/meals/{id} (admin): only the fields present in the body change.
#[tracing::instrument(skip(state, patch))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
    Json(patch): Json<MealPatch>,
) -> Result<Json<Meal>, ApiError> {
    Ok(Json(state.meals.update(MealId::new(id), patch).await?))
}

/// DELETE /api/meals/{id} (admin)
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.meals.delete(MealId::new(id)).await?;
    Ok(MessageResponse::new("meal deleted"))
}
