use axum::Router;

use crate::state::AppState;

mod claims;
pub mod cookies;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod repo;
pub mod repo_types;
pub mod services;

use policy::{protect, Guard, ResponseFormat, TokenPolicy};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().merge(handlers::auth_routes()).merge(protect(
        handlers::me_routes(),
        Guard::new(state.clone(), TokenPolicy, ResponseFormat::Json),
    ))
}
