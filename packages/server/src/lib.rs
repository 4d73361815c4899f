pub mod config;
pub mod consumers;
pub mod database;
pub mod dlq;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod publisher;
pub mod routes;
pub mod seed;
pub mod state;

use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .nest("/api", routes::api_routes())
        .with_state(state)
}
