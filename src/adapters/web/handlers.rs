//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::Uri,
};
use std::sync::Arc;

use crate::domain::backtest::{BacktestRequest, BacktestResult};
use crate::domain::error::BacktestError;
use crate::domain::instrument::Instrument;

use super::{AppState, WebError};

pub async fn list_instruments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Instrument>>, WebError> {
    let catalog = Arc::clone(state.orchestrator.catalog());
    let instruments = tokio::task::spawn_blocking(move || catalog.list_all())
        .await
        .map_err(|e| {
            WebError::from(BacktestError::WorkerFailed {
                instrument: "catalog".into(),
                reason: e.to_string(),
            })
        })??;
    Ok(Json(instruments))
}

/// The body is decoded here rather than through the `Json` extractor so that
/// malformed input gets the same error body as every other client error.
pub async fn run_backtest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BacktestResult>, WebError> {
    let request: BacktestRequest = serde_json::from_slice(&body)
        .map_err(|e| WebError::bad_request(format!("invalid request body: {e}")))?;
    let result = state.orchestrator.run(request).await?;
    Ok(Json(result))
}

pub async fn not_found(uri: Uri) -> WebError {
    WebError::not_found(format!("no route for {}", uri.path()))
}
