//! Request identity.
//!
//! Token issuance happens upstream; the gateway forwards the authenticated
//! user in `x-user-id` and, for staff, `x-user-role: admin`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

/// An authenticated caller with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub UserId);

fn user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthenticated("missing user identity".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(UserId::new)
        .ok_or_else(|| ApiError::Unauthenticated("invalid user identity".to_string()))
}

/// Returns true if the request carries the admin role.
pub fn is_admin(headers: &HeaderMap) -> bool {
    headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.eq_ignore_ascii_case("admin"))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id(&parts.headers).map(CurrentUser)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id(&parts.headers)?;
        if !is_admin(&parts.headers) {
            tracing::warn!(%user_id, "admin route requested without admin role");
            return Err(ApiError::Forbidden("admin access required".to_string()));
        }
        Ok(AdminUser(user_id))
    }
}
