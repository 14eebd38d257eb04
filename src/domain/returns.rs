//! Per-period strategy returns from prices and target weights.

use crate::domain::error::BacktestError;
use crate::domain::price::PriceSeries;
use crate::domain::signal::PositionSignal;
use chrono::NaiveDate;

pub const MIN_PRICE_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    /// Closing date of the period.
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub instrument: String,
    pub points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReturnsCalculator {
    /// Proportional cost charged on turnover |w(t) - w(t-1)|.
    pub commission_pct: f64,
}

impl ReturnsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commission(commission_pct: f64) -> Self {
        Self { commission_pct }
    }

    /// r(t+1) = w(t) * (p(t+1) - p(t)) / p(t), less turnover cost.
    pub fn compute(
        &self,
        series: &PriceSeries,
        signal: &PositionSignal,
    ) -> Result<ReturnSeries, BacktestError> {
        let instrument = series.instrument();
        let prices = series.points();
        let weights = signal.points();

        if prices.len() < MIN_PRICE_POINTS {
            return Err(BacktestError::InsufficientData {
                instrument: instrument.to_string(),
                points: prices.len(),
                minimum: MIN_PRICE_POINTS,
            });
        }

        if weights.len() != prices.len() {
            return Err(BacktestError::SeriesMisalignment {
                instrument: instrument.to_string(),
                reason: format!(
                    "{} prices but {} weights",
                    prices.len(),
                    weights.len()
                ),
            });
        }
        if let Some((p, w)) = prices.iter().zip(weights).find(|(p, w)| p.date != w.date) {
            return Err(BacktestError::SeriesMisalignment {
                instrument: instrument.to_string(),
                reason: format!("price dated {} paired with weight dated {}", p.date, w.date),
            });
        }

        if let Some(bad) = prices.iter().find(|p| p.close <= 0.0) {
            return Err(BacktestError::InvalidPriceData {
                instrument: instrument.to_string(),
                date: bad.date,
                reason: format!("non-positive close {}", bad.close),
            });
        }

        let mut points = Vec::with_capacity(prices.len() - 1);
        let mut prev_weight = 0.0;
        for i in 0..prices.len() - 1 {
            let weight = weights[i].weight;
            let price_change = (prices[i + 1].close - prices[i].close) / prices[i].close;
            let mut value = weight * price_change;
            if self.commission_pct > 0.0 {
                value -= self.commission_pct * (weight - prev_weight).abs();
            }
            prev_weight = weight;
            points.push(ReturnPoint {
                date: prices[i + 1].date,
                value,
            });
        }

        Ok(ReturnSeries {
            instrument: instrument.to_string(),
            points,
        })
    }
}
