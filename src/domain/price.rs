//! Daily price observations and validated price series.

use crate::domain::error::BacktestError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
}

impl PricePoint {
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }

    /// Checks close ≥ 0 and, when the range is present, low ≤ {open, close} ≤ high.
    pub fn check(&self) -> Result<(), String> {
        if !self.close.is_finite() || self.close < 0.0 {
            return Err(format!("close must be a finite non-negative number, got {}", self.close));
        }
        for (label, value) in [("open", self.open), ("high", self.high), ("low", self.low)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{label} must be a finite non-negative number, got {v}"));
                }
            }
        }
        if let (Some(low), Some(high)) = (self.low, self.high) {
            if low > high {
                return Err(format!("low {low} above high {high}"));
            }
            if self.close < low || self.close > high {
                return Err(format!("close {} outside [{low}, {high}]", self.close));
            }
            if let Some(open) = self.open {
                if open < low || open > high {
                    return Err(format!("open {open} outside [{low}, {high}]"));
                }
            }
        }
        if let Some(volume) = self.volume {
            if volume < 0 {
                return Err(format!("negative volume {volume}"));
            }
        }
        Ok(())
    }
}

/// Ordered daily observations for one instrument.
///
/// Dates are strictly increasing; every point has passed [`PricePoint::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(instrument: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, BacktestError> {
        let instrument = instrument.into();

        for (i, point) in points.iter().enumerate() {
            point.check().map_err(|reason| BacktestError::InvalidPriceData {
                instrument: instrument.clone(),
                date: point.date,
                reason,
            })?;
            if i > 0 && points[i - 1].date >= point.date {
                return Err(BacktestError::InvalidPriceData {
                    instrument: instrument.clone(),
                    date: point.date,
                    reason: format!(
                        "dates must be strictly increasing (previous {})",
                        points[i - 1].date
                    ),
                });
            }
        }

        Ok(Self { instrument, points })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Fill every missing weekday between observations with the previous close.
    ///
    /// Filled points carry open = high = low = close and no volume. Weekends are
    /// never inserted; observations that fall on a weekend are kept as they are.
    pub fn forward_filled(&self) -> PriceSeries {
        let mut filled: Vec<PricePoint> = Vec::with_capacity(self.points.len());

        for point in &self.points {
            if let Some(prev) = filled.last().cloned() {
                let mut day = prev.date + Duration::days(1);
                while day < point.date {
                    if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                        filled.push(PricePoint {
                            date: day,
                            close: prev.close,
                            open: Some(prev.close),
                            high: Some(prev.close),
                            low: Some(prev.close),
                            volume: None,
                        });
                    }
                    day += Duration::days(1);
                }
            }
            filled.push(point.clone());
        }

        PriceSeries {
            instrument: self.instrument.clone(),
            points: filled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ohlc(date: &str, open: f64, high: f64, low: f64, close: f64) -> PricePoint {
        PricePoint {
            date: d(date),
            close,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            volume: Some(1_000),
        }
    }

    #[test]
    fn series_accepts_increasing_dates() {
        let series = PriceSeries::new(
            "SBER",
            vec![
                PricePoint::close_only(d("2024-01-02"), 100.0),
                PricePoint::close_only(d("2024-01-03"), 101.0),
            ],
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.instrument(), "SBER");
        assert_eq!(series.closes(), vec![100.0, 101.0]);
        assert_eq!(series.first_date(), Some(d("2024-01-02")));
        assert_eq!(series.last_date(), Some(d("2024-01-03")));
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let err = PriceSeries::new(
            "SBER",
            vec![
                PricePoint::close_only(d("2024-01-02"), 100.0),
                PricePoint::close_only(d("2024-01-02"), 101.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidPriceData { .. }));
    }

    #[test]
    fn series_rejects_unordered_dates() {
        let result = PriceSeries::new(
            "SBER",
            vec![
                PricePoint::close_only(d("2024-01-03"), 100.0),
                PricePoint::close_only(d("2024-01-02"), 101.0),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn point_rejects_negative_close() {
        assert!(PricePoint::close_only(d("2024-01-02"), -1.0).check().is_err());
        assert!(PricePoint::close_only(d("2024-01-02"), f64::NAN).check().is_err());
        assert!(PricePoint::close_only(d("2024-01-02"), 0.0).check().is_ok());
    }

    #[test]
    fn point_checks_ohlc_consistency() {
        assert!(ohlc("2024-01-02", 100.0, 110.0, 90.0, 105.0).check().is_ok());
        // close above high
        assert!(ohlc("2024-01-02", 100.0, 110.0, 90.0, 111.0).check().is_err());
        // open below low
        assert!(ohlc("2024-01-02", 89.0, 110.0, 90.0, 100.0).check().is_err());
        // inverted range
        assert!(ohlc("2024-01-02", 100.0, 90.0, 110.0, 100.0).check().is_err());
    }

    #[test]
    fn forward_fill_inserts_missing_weekdays_only() {
        // Thu 2024-01-04 .. Tue 2024-01-09: Fri and Mon are missing, Sat/Sun skipped
        let series = PriceSeries::new(
            "SBER",
            vec![
                PricePoint::close_only(d("2024-01-04"), 100.0),
                PricePoint::close_only(d("2024-01-09"), 104.0),
            ],
        )
        .unwrap();
        let filled = series.forward_filled();
        let dates: Vec<NaiveDate> = filled.dates().collect();
        assert_eq!(
            dates,
            vec![d("2024-01-04"), d("2024-01-05"), d("2024-01-08"), d("2024-01-09")]
        );
        assert_eq!(filled.closes(), vec![100.0, 100.0, 100.0, 104.0]);
        assert_eq!(filled.points()[1].volume, None);
    }

    #[test]
    fn forward_fill_is_noop_without_gaps() {
        let series = PriceSeries::new(
            "SBER",
            vec![
                PricePoint::close_only(d("2024-01-04"), 100.0),
                PricePoint::close_only(d("2024-01-05"), 101.0),
            ],
        )
        .unwrap();
        assert_eq!(series.forward_filled(), series);
    }
}
