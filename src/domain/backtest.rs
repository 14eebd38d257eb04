//! Backtest request/response types and engine settings.

use crate::domain::alpha::AlphaSpec;
use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::BacktestError;
use crate::domain::metrics::{EquityPoint, MetricsConfig, RiskMetrics};
use crate::domain::universe::validate_instruments;
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (reduced to its UTC day).
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD or RFC 3339"))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub instruments: Vec<String>,
    #[serde(deserialize_with = "deserialize_date")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub alpha: AlphaSpec,
    #[serde(default)]
    pub include_curve: bool,
}

impl BacktestRequest {
    pub fn new(instruments: Vec<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            instruments,
            start_date,
            end_date,
            alpha: AlphaSpec::default(),
            include_curve: false,
        }
    }

    pub fn with_alpha(mut self, alpha: AlphaSpec) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_curve(mut self, include_curve: bool) -> Self {
        self.include_curve = include_curve;
        self
    }

    /// Structural checks that need no data access.
    pub fn check(&self) -> Result<(), BacktestError> {
        validate_instruments(&self.instruments)?;
        if self.start_date >= self.end_date {
            return Err(BacktestError::invalid_request(
                "start_date",
                format!(
                    "start_date ({}) must be before end_date ({})",
                    self.start_date, self.end_date
                ),
            ));
        }
        Ok(())
    }
}

/// Performance of one instrument over the requested range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub figi: String,
    pub ticker: String,
    pub currency: String,
    pub alpha: String,
    /// First and last observation actually used.
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    #[serde(flatten)]
    pub metrics: RiskMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_curve: Option<Vec<EquityPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InstrumentOutcome {
    Success(PerformanceSummary),
    Failure { error: String, message: String },
}

impl InstrumentOutcome {
    pub fn failure(err: &BacktestError) -> Self {
        InstrumentOutcome::Failure {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentResult {
    /// The identifier exactly as requested.
    pub instrument: String,
    #[serde(flatten)]
    pub outcome: InstrumentOutcome,
}

impl InstrumentResult {
    pub fn summary(&self) -> Option<&PerformanceSummary> {
        match &self.outcome {
            InstrumentOutcome::Success(summary) => Some(summary),
            InstrumentOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_some()
    }

    /// Error kind of a failed slot.
    pub fn error_kind(&self) -> Option<&str> {
        match &self.outcome {
            InstrumentOutcome::Success(_) => None,
            InstrumentOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// One entry per requested instrument, in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub results: Vec<InstrumentResult>,
}

impl BacktestResult {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub metrics: MetricsConfig,
    pub commission_pct: f64,
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    /// Reject the whole request when any identifier is unknown.
    pub strict_instruments: bool,
}

pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            commission_pct: 0.0,
            max_workers: default_max_workers(),
            timeout: None,
            strict_instruments: false,
        }
    }
}

impl EngineConfig {
    /// Build from the `[engine]` section, validating it first.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BacktestError> {
        validate_engine_config(config)?;
        let defaults = EngineConfig::default();

        let max_workers = config.get_int("engine", "max_workers", 0);
        let timeout_secs = config.get_double("engine", "timeout_secs", 0.0);
        let timeout = if timeout_secs > 0.0 {
            let limit = Duration::try_from_secs_f64(timeout_secs).map_err(|e| {
                BacktestError::ConfigInvalid {
                    section: "engine".to_string(),
                    key: "timeout_secs".to_string(),
                    reason: e.to_string(),
                }
            })?;
            Some(limit)
        } else {
            None
        };

        Ok(EngineConfig {
            metrics: MetricsConfig {
                annualization_factor: config.get_double(
                    "engine",
                    "annualization_factor",
                    defaults.metrics.annualization_factor,
                ),
                risk_free_rate: config.get_double(
                    "engine",
                    "risk_free_rate",
                    defaults.metrics.risk_free_rate,
                ),
            },
            commission_pct: config.get_double("engine", "commission_pct", 0.0),
            max_workers: if max_workers > 0 {
                max_workers as usize
            } else {
                defaults.max_workers
            },
            timeout,
            strict_instruments: config.get_bool("engine", "strict_instruments", false),
        })
    }
}
