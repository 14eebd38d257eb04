//! HTTP adapter: JSON API over the backtest orchestrator.

mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::orchestrator::BacktestOrchestrator;

pub struct AppState {
    pub orchestrator: BacktestOrchestrator,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/instruments", get(handlers::list_instruments))
        .route("/backtest", post(handlers::run_backtest))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `listen` and serve until ctrl-c.
pub async fn serve(listen: &str, state: AppState) -> Result<(), crate::domain::error::BacktestError> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(listen, "http server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
