//! Instrument lists: parsing from config/CLI text and request validation.
//!
//! Identifiers are kept as the caller wrote them (trimmed) so that results
//! echo the request; duplicate detection ignores ASCII case.

use crate::domain::error::BacktestError;
use std::collections::HashSet;

pub const INSTRUMENTS_FIELD: &str = "instruments";

/// Parse a comma-separated identifier list such as `SBER, BBG004731032`.
pub fn parse_instrument_list(input: &str) -> Result<Vec<String>, BacktestError> {
    if input.trim().is_empty() {
        return Err(BacktestError::invalid_request(
            INSTRUMENTS_FIELD,
            "instrument list is empty",
        ));
    }
    let identifiers: Vec<String> = input.split(',').map(|t| t.trim().to_string()).collect();
    validate_instruments(&identifiers)?;
    Ok(identifiers)
}

/// Reject empty lists, blank identifiers and duplicates.
pub fn validate_instruments(identifiers: &[String]) -> Result<(), BacktestError> {
    if identifiers.is_empty() {
        return Err(BacktestError::invalid_request(
            INSTRUMENTS_FIELD,
            "at least one instrument is required",
        ));
    }

    let mut seen = HashSet::new();
    for (i, identifier) in identifiers.iter().enumerate() {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(BacktestError::invalid_request(
                INSTRUMENTS_FIELD,
                format!("identifier #{} is blank", i + 1),
            ));
        }
        if !seen.insert(trimmed.to_ascii_uppercase()) {
            return Err(BacktestError::invalid_request(
                INSTRUMENTS_FIELD,
                format!("duplicate identifier: {trimmed}"),
            ));
        }
    }
    Ok(())
}
