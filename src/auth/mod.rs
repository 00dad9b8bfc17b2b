use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod email;
pub mod error;
pub mod federated;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
