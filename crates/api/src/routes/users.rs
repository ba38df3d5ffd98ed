//! Account registration.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use store::{Role, Store, User};

use super::auth::is_admin;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// POST /api/users
///
/// Anyone may register a customer account; only admins may create admins.
#[tracing::instrument(skip(state, headers, req))]
pub async fn register<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let role = match req.role.as_deref() {
        None => Role::Customer,
        Some(role) => role
            .parse::<Role>()
            .map_err(|_| ApiError::BadRequest(format!("unknown role '{role}'")))?,
    };
    if role == Role::Admin && !is_admin(&headers) {
        return Err(ApiError::Forbidden(
            "only admins may create admin accounts".to_string(),
        ));
    }

    let user = state.users.register(&req.email, role).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
