//! HTTP route handlers.

pub mod auth;
pub mod cart;
pub mod health;
pub mod meals;
pub mod menus;
pub mod metrics;
pub mod orders;
pub mod users;

/// Body of endpoints that only acknowledge.
#[derive(Debug, serde::Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> axum::Json<Self> {
        axum::Json(Self { message })
    }
}
