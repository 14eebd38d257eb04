//! Domain error types.

use chrono::NaiveDate;

/// A parse error with position information for alpha expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for alphatest.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("invalid request field '{field}': {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("unknown instrument: {identifier}")]
    UnknownInstrument { identifier: String },

    #[error("ticker {identifier} matches {matches} instruments, use a FIGI instead")]
    AmbiguousInstrument { identifier: String, matches: usize },

    #[error("no price data for {instrument} between {start_date} and {end_date}")]
    DataUnavailable {
        instrument: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },

    #[error("insufficient data for {instrument}: have {points} points, need {minimum}")]
    InsufficientData {
        instrument: String,
        points: usize,
        minimum: usize,
    },

    #[error("invalid price data for {instrument} on {date}: {reason}")]
    InvalidPriceData {
        instrument: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("series misalignment for {instrument}: {reason}")]
    SeriesMisalignment { instrument: String, reason: String },

    #[error("backtest cancelled")]
    Cancelled,

    #[error("backtest timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("all {count} instruments failed (first failure: {first})")]
    AllInstrumentsFailed { count: usize, first: String },

    #[error("instrument worker failed for {instrument}: {reason}")]
    WorkerFailed { instrument: String, reason: String },

    #[error("illegal run state transition {from} -> {to}")]
    StateTransition { from: String, to: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    AlphaParse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    pub fn invalid_request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BacktestError::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name used in error bodies and per-instrument markers.
    pub fn kind(&self) -> &'static str {
        match self {
            BacktestError::InvalidRequest { .. } | BacktestError::AlphaParse(_) => {
                "InvalidRequest"
            }
            BacktestError::UnknownInstrument { .. } => "UnknownInstrument",
            BacktestError::AmbiguousInstrument { .. } => "AmbiguousInstrument",
            BacktestError::DataUnavailable { .. } => "DataUnavailable",
            BacktestError::InsufficientData { .. } => "InsufficientData",
            BacktestError::InvalidPriceData { .. } => "InvalidPriceData",
            BacktestError::SeriesMisalignment { .. } => "SeriesMisalignment",
            BacktestError::Cancelled => "Cancelled",
            BacktestError::Timeout { .. } => "Timeout",
            BacktestError::AllInstrumentsFailed { .. } => "AllInstrumentsFailed",
            BacktestError::WorkerFailed { .. } => "WorkerFailed",
            BacktestError::StateTransition { .. } => "InternalError",
            BacktestError::Database { .. } | BacktestError::DatabaseQuery { .. } => {
                "DataSourceError"
            }
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => "ConfigError",
            BacktestError::Io(_) => "IoError",
        }
    }

    /// Client-side errors: the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BacktestError::InvalidRequest { .. }
                | BacktestError::AlphaParse(_)
                | BacktestError::UnknownInstrument { .. }
                | BacktestError::AmbiguousInstrument { .. }
        )
    }
}

impl BacktestError {
    /// Process exit status for the command line: 1 I/O or internal, 2 config or
    /// request, 3 data store, 4 alpha parse, 5 data availability, 6 cancelled.
    pub fn exit_status(&self) -> u8 {
        match self {
            BacktestError::Io(_)
            | BacktestError::WorkerFailed { .. }
            | BacktestError::StateTransition { .. }
            | BacktestError::InvalidPriceData { .. }
            | BacktestError::SeriesMisalignment { .. } => 1,
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. }
            | BacktestError::InvalidRequest { .. }
            | BacktestError::UnknownInstrument { .. }
            | BacktestError::AmbiguousInstrument { .. } => 2,
            BacktestError::Database { .. } | BacktestError::DatabaseQuery { .. } => 3,
            BacktestError::AlphaParse(_) => 4,
            BacktestError::DataUnavailable { .. }
            | BacktestError::InsufficientData { .. }
            | BacktestError::AllInstrumentsFailed { .. } => 5,
            BacktestError::Cancelled | BacktestError::Timeout { .. } => 6,
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
