mod app_state;
pub mod auth;
pub mod middleware;
mod routes;
mod shutdown;

pub use app_state::AppState;

use anyhow::Result;
use axum::{middleware as axum_mw, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::engine::Trigger;

/// Starts the periodic tick loop and the HTTP server. Runs until a shutdown
/// signal is received; the tick task is aborted when `run` returns.
pub async fn run(config: Config, trigger: Trigger) -> Result<()> {
    let tick_interval = config.trigger.tick_interval()?;
    let state = AppState::new(config.clone(), trigger.clone());

    let tick_task = tokio::spawn(tick_loop(trigger, tick_interval));

    let app = create_router(state.clone());

    let addr = SocketAddr::new(config.server.bind.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    tick_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

async fn tick_loop(trigger: Trigger, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now();
        let dispatched = trigger.trigger_ready_jobs(now).await;
        if dispatched > 0 {
            info!(dispatched, "Tick dispatched jobs");
        }
    }
}

fn create_router(state: Arc<AppState>) -> Router {
    let router = routes::routes();

    // Apply security middleware (order matters: first applied = last executed)
    let router = router
        .layer(axum_mw::from_fn(middleware::request_timing))
        .layer(axum_mw::from_fn_with_state(state.clone(), middleware::rate_limiting))
        .layer(axum_mw::from_fn_with_state(state.clone(), middleware::jwt_auth))
        .layer(axum_mw::from_fn_with_state(state.clone(), middleware::network_isolation));

    let router = middleware::apply(router, state.clone());

    router.with_state(state)
}
