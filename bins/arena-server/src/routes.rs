use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/api/problems", get(handlers::list_problems))
        .route("/api/problems/:id", get(handlers::get_problem))
        .route("/api/problems/:id/submit", post(handlers::submit_solution))
        .route("/api/check/:id", get(handlers::check_submission))
        .route("/api/leaderboard/:competition_id", get(handlers::get_leaderboard))
}
