use axum::Router;
use axum::routing::{get, post};

use crate::handlers::submission;
use crate::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/submissions", post(submission::create_submission))
        .route("/submissions/{id}", get(submission::get_submission))
}
