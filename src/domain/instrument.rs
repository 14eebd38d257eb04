//! Instrument metadata resolved by the catalog.

use crate::domain::error::BacktestError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub figi: String,
    pub ticker: String,
    pub name: String,
    pub currency: String,
    pub lot: u32,
    pub min_price_increment: f64,
}

impl Instrument {
    /// Checks the metadata invariants: non-empty key, positive lot and tick size.
    pub fn validate(&self) -> Result<(), String> {
        if self.figi.trim().is_empty() {
            return Err("figi must not be empty".into());
        }
        if self.lot == 0 {
            return Err(format!("{}: lot must be positive", self.figi));
        }
        if !(self.min_price_increment.is_finite() && self.min_price_increment > 0.0) {
            return Err(format!(
                "{}: min_price_increment must be positive",
                self.figi
            ));
        }
        Ok(())
    }
}

/// Look up `identifier` in a catalog listing: FIGI first, then ticker.
///
/// Both comparisons ignore ASCII case. A ticker shared by several instruments
/// (listed on more than one exchange) is reported as ambiguous.
pub fn resolve_identifier(
    instruments: &[Instrument],
    identifier: &str,
) -> Result<Instrument, BacktestError> {
    let identifier = identifier.trim();
    if let Some(inst) = instruments
        .iter()
        .find(|i| i.figi.eq_ignore_ascii_case(identifier))
    {
        return Ok(inst.clone());
    }

    let by_ticker: Vec<&Instrument> = instruments
        .iter()
        .filter(|i| i.ticker.eq_ignore_ascii_case(identifier))
        .collect();

    match by_ticker.as_slice() {
        [] => Err(BacktestError::UnknownInstrument {
            identifier: identifier.to_string(),
        }),
        [single] => Ok((*single).clone()),
        many => Err(BacktestError::AmbiguousInstrument {
            identifier: identifier.to_string(),
            matches: many.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Instrument {
        Instrument {
            figi: "BBG004730N88".into(),
            ticker: "SBER".into(),
            name: "Sberbank".into(),
            currency: "rub".into(),
            lot: 10,
            min_price_increment: 0.01,
        }
    }

    #[test]
    fn valid_instrument_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn zero_lot_rejected() {
        let inst = Instrument { lot: 0, ..sample() };
        assert!(inst.validate().unwrap_err().contains("lot"));
    }

    #[test]
    fn non_positive_tick_rejected() {
        let inst = Instrument {
            min_price_increment: 0.0,
            ..sample()
        };
        assert!(inst.validate().is_err());
    }

    #[test]
    fn resolve_by_figi_or_ticker_ignoring_case() {
        let catalog = vec![sample()];
        assert_eq!(
            resolve_identifier(&catalog, "BBG004730N88").unwrap().ticker,
            "SBER"
        );
        assert_eq!(
            resolve_identifier(&catalog, " sber ").unwrap().figi,
            "BBG004730N88"
        );
    }

    #[test]
    fn resolve_unknown() {
        let catalog = vec![sample()];
        let err = resolve_identifier(&catalog, "GAZP").unwrap_err();
        assert!(matches!(err, BacktestError::UnknownInstrument { identifier } if identifier == "GAZP"));
    }

    #[test]
    fn resolve_prefers_figi_over_ticker() {
        let other = Instrument {
            figi: "SBER".into(),
            ticker: "OTHER".into(),
            ..sample()
        };
        let catalog = vec![sample(), other];
        assert_eq!(resolve_identifier(&catalog, "SBER").unwrap().ticker, "OTHER");
    }

    #[test]
    fn resolve_ambiguous_ticker() {
        let dup = Instrument {
            figi: "BBG000000001".into(),
            ..sample()
        };
        let catalog = vec![sample(), dup];
        let err = resolve_identifier(&catalog, "SBER").unwrap_err();
        assert!(matches!(
            err,
            BacktestError::AmbiguousInstrument { matches: 2, .. }
        ));
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["figi"], "BBG004730N88");
        assert_eq!(json["lot"], 10);
        assert_eq!(json["min_price_increment"], 0.01);
    }
}
