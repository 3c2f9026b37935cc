mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use axum::Router;

use crate::{
    auth::policy::{protect, Guard, ResponseFormat, TokenPolicy},
    state::AppState,
};

/// `/api/actions` and `/api/analyses`, bearer-token protected.
pub fn router(state: &AppState) -> Router<AppState> {
    protect(
        handlers::api_routes(),
        Guard::new(state.clone(), TokenPolicy, ResponseFormat::Json),
    )
}
