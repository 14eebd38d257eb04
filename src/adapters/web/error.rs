//! HTTP error responses for the web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::domain::error::BacktestError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub kind: String,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
    }
}

pub fn status_from_error(err: &BacktestError) -> StatusCode {
    match err {
        BacktestError::InvalidRequest { .. }
        | BacktestError::AlphaParse(_)
        | BacktestError::UnknownInstrument { .. }
        | BacktestError::AmbiguousInstrument { .. } => StatusCode::BAD_REQUEST,
        BacktestError::DataUnavailable { .. }
        | BacktestError::InsufficientData { .. }
        | BacktestError::InvalidPriceData { .. }
        | BacktestError::SeriesMisalignment { .. }
        | BacktestError::AllInstrumentsFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BacktestError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        BacktestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BacktestError::WorkerFailed { .. }
        | BacktestError::StateTransition { .. }
        | BacktestError::Database { .. }
        | BacktestError::DatabaseQuery { .. }
        | BacktestError::ConfigParse { .. }
        | BacktestError::ConfigMissing { .. }
        | BacktestError::ConfigInvalid { .. }
        | BacktestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BacktestError> for WebError {
    fn from(err: BacktestError) -> Self {
        Self::new(status_from_error(&err), err.kind(), err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: &self.kind,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
