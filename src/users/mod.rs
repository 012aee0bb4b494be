mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod repo;
mod services;

use crate::state::AppState;
use axum::Router;

/// `avatar_max_bytes` sizes the request body limit on the upload route.
pub fn router(avatar_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::account_routes())
        .merge(handlers::avatar_routes(avatar_max_bytes))
}
