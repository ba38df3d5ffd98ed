//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable identity on the request.
    #[error("{0}")]
    Unauthenticated(String),
    /// Identity lacks the required role.
    #[error("{0}")]
    Forbidden(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Resource that is not addressed by id, such as the active menu.
    #[error("{0}")]
    NotFound(String),
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Checkout error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::InvalidInput(_) | DomainError::LimitExceeded { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        DomainError::Unauthorized { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        DomainError::Conflict(_)
        | DomainError::MealInUse(_)
        | DomainError::ActiveMenuDeletion(_) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Store(store_err) => store_error_to_response(store_err),
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidCartSize { .. }
        | CheckoutError::InvalidDate(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::NoActiveMenu
        | CheckoutError::MealNotOnMenu { .. }
        | CheckoutError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::Domain(domain_err) => domain_error_to_response(domain_err),
        CheckoutError::Store(store_err) => store_error_to_response(&store_err),
    }
}

fn store_error_to_response(err: &StoreError) -> (StatusCode, String) {
    match err {
        StoreError::Conflict(_) | StoreError::InsufficientStock { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}
