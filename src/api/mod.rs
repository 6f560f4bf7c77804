// API module - operational HTTP endpoints next to the bot

pub mod health;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::context::AppContext;

pub type AppState = Arc<AppContext>;

pub fn router(ctx: AppState) -> Router {
    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health_check))
        .route("/status", get(health::status))
        .with_state(ctx)
}
