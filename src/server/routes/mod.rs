mod api;
mod health;
mod webhook;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::health_check))
        .route("/completions", post(webhook::completions))
        .route("/applications/:tenant/:name/change", post(api::trigger_change))
        .route("/applications/:tenant/:name/cancel", post(api::cancel_change))
        .route("/applications/:tenant/:name/force/:job_type", post(api::force_trigger))
        .route("/applications/:tenant/:name/jobs", get(api::jobs_to_run))
}

async fn root() -> &'static str {
    "deploytrig"
}
