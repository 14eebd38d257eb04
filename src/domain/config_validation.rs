//! Configuration validation.
//!
//! Validates config sections before anything is built from them. Keys that
//! are absent fall back to defaults; keys that are present must be well formed.

use crate::domain::alpha::AlphaSpec;
use crate::domain::backtest::parse_date;
use crate::domain::error::BacktestError;
use crate::domain::universe::parse_instrument_list;
use crate::ports::config_port::ConfigPort;

pub const BACKENDS: &[&str] = &["csv", "sqlite"];

/// One day. Longer limits are almost certainly a unit mistake.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_annualization_factor(config)?;
    validate_risk_free_rate(config)?;
    validate_commission(config)?;
    validate_max_workers(config)?;
    validate_timeout(config)?;
    validate_bool(config, "engine", "strict_instruments")?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match backend(config)?.as_str() {
        "csv" => {
            require(config, "data", "csv_dir")?;
        }
        _ => {
            require(config, "sqlite", "path")?;
            if let Some(pool_size) = number(config, "sqlite", "pool_size")? {
                if pool_size < 1.0 || pool_size.fract() != 0.0 {
                    return Err(invalid("sqlite", "pool_size", "pool_size must be a positive integer"));
                }
            }
        }
    }
    validate_cache(config)?;
    Ok(())
}

/// Checks the `[backtest]` keys that are present; none are required here since
/// the command line may supply them.
pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(list) = config.get_string("backtest", "instruments") {
        parse_instrument_list(&list)
            .map_err(|e| invalid("backtest", "instruments", &reason_of(e)))?;
    }

    let start = date(config, "start_date")?;
    let end = date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
        }
    }

    if let Some(alpha) = config.get_string("backtest", "alpha") {
        let spec: AlphaSpec = alpha
            .parse()
            .map_err(|e| invalid("backtest", "alpha", &reason_of(e)))?;
        spec.build()?;
    }
    Ok(())
}

/// The configured data backend, lowercased; `csv` when unset.
pub fn backend(config: &dyn ConfigPort) -> Result<String, BacktestError> {
    let backend = config
        .get_string("data", "backend")
        .map(|b| b.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());
    if !BACKENDS.contains(&backend.as_str()) {
        return Err(invalid(
            "data",
            "backend",
            &format!("unknown backend '{}' (expected {})", backend, BACKENDS.join(" or ")),
        ));
    }
    Ok(backend)
}

fn invalid(section: &str, key: &str, reason: &str) -> BacktestError {
    BacktestError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn reason_of(err: BacktestError) -> String {
    match err {
        BacktestError::InvalidRequest { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, BacktestError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(BacktestError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Numeric value of a key, `None` when absent.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, &format!("'{}' is not a number", raw.trim()))),
    }
}

fn date(config: &dyn ConfigPort, key: &str) -> Result<Option<chrono::NaiveDate>, BacktestError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(raw) => parse_date(&raw).map(Some).map_err(|reason| invalid("backtest", key, &reason)),
    }
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), BacktestError> {
    if let Some(raw) = config.get_string(section, key) {
        let ok = matches!(
            raw.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "false" | "no" | "0"
        );
        if !ok {
            return Err(invalid(section, key, &format!("'{}' is not a boolean", raw.trim())));
        }
    }
    Ok(())
}

fn validate_annualization_factor(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = number(config, "engine", "annualization_factor")? {
        if value <= 0.0 {
            return Err(invalid(
                "engine",
                "annualization_factor",
                "annualization_factor must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = number(config, "engine", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "engine",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = number(config, "engine", "commission_pct")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "engine",
                "commission_pct",
                "commission_pct must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_max_workers(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = number(config, "engine", "max_workers")? {
        if value < 0.0 || value.fract() != 0.0 {
            return Err(invalid(
                "engine",
                "max_workers",
                "max_workers must be a non-negative integer (0 = one per CPU)",
            ));
        }
    }
    Ok(())
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = number(config, "engine", "timeout_secs")? {
        if value < 0.0 {
            return Err(invalid(
                "engine",
                "timeout_secs",
                "timeout_secs must be non-negative (0 = no timeout)",
            ));
        }
        if value > MAX_TIMEOUT_SECS {
            return Err(invalid(
                "engine",
                "timeout_secs",
                &format!("timeout_secs must be at most {MAX_TIMEOUT_SECS}"),
            ));
        }
    }
    Ok(())
}

fn validate_cache(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_bool(config, "cache", "enabled")?;
    if let Some(value) = number(config, "cache", "max_entries")? {
        if value < 1.0 || value.fract() != 0.0 {
            return Err(invalid("cache", "max_entries", "max_entries must be a positive integer"));
        }
    }
    Ok(())
}
