//! Weekly menu endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::MenuId;
use serde::Deserialize;
use store::{MenuEntry, Store, WeeklyMenu};

use super::MessageResponse;
use super::auth::AdminUser;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MenuRequest {
    pub week_start_date: String,
    pub meals: Vec<MenuEntry>,
}

/// GET /api/menu: the active menu with stock.
#[tracing::instrument(skip(state))]
pub async fn active<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<WeeklyMenu>, ApiError> {
    let menu = state
        .menus
        .get_active()
        .await?
        .ok_or_else(|| ApiError::NotFound("no active menu".to_string()))?;
    Ok(Json(menu))
}

/// GET /api/admin/weekly-menus
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<WeeklyMenu>>, ApiError> {
    Ok(Json(state.menus.list().await?))
}

/// GET /api/admin/weekly-menus/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<WeeklyMenu>, ApiError> {
    Ok(Json(state.menus.get(MenuId::new(id)).await?))
}

/// POST /api/admin/weekly-menus
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Json(req): Json<MenuRequest>,
) -> Result<(StatusCode, Json<WeeklyMenu>), ApiError> {
    let menu = state.menus.create(&req.week_start_date, &req.meals).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

/// PUT /api/admin/weekly-menus/{id}: replaces the week and meal set.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<MenuRequest>,
) -> Result<Json<WeeklyMenu>, ApiError> {
    let menu = state
        .menus
        .update(MenuId::new(id), &req.week_start_date, &req.meals)
        .await?;
    Ok(Json(menu))
}

/// PUT /api/admin/weekly-menus/{id}/activate
#[tracing::instrument(skip(state))]
pub async fn activate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.menus.activate(MenuId::new(id)).await?;
    Ok(MessageResponse::new("menu activated"))
}

/// DELETE /api/admin/weekly-menus/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.menus.delete(MenuId::new(id)).await?;
    Ok(MessageResponse::new("menu deleted"))
}
