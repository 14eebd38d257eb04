//! Position signals and the alpha strategy capability.

use crate::domain::price::PriceSeries;
use chrono::NaiveDate;

/// How a strategy wants gaps between trading days handled before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    #[default]
    Preserve,
    ForwardFill,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalPoint {
    pub date: NaiveDate,
    pub weight: f64,
}

/// Target weights aligned 1:1 with the dates of a [`PriceSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSignal {
    points: Vec<SignalPoint>,
}

impl PositionSignal {
    /// Pair raw strategy output with the series dates.
    ///
    /// Non-finite values become flat (0) and everything else is clamped to [-1, 1].
    /// Missing trailing values are emitted as flat so the signal always covers
    /// every date of the series.
    pub fn from_raw(series: &PriceSeries, raw: &[f64]) -> Self {
        let points = series
            .dates()
            .enumerate()
            .map(|(i, date)| SignalPoint {
                date,
                weight: sanitize_weight(raw.get(i).copied().unwrap_or(0.0)),
            })
            .collect();
        Self { points }
    }

    /// Same weight on every date of the series.
    pub fn constant(series: &PriceSeries, weight: f64) -> Self {
        let weight = sanitize_weight(weight);
        Self {
            points: series.dates().map(|date| SignalPoint { date, weight }).collect(),
        }
    }

    /// Build from explicit points; used by callers that assemble signals by hand.
    pub fn from_points(points: Vec<SignalPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[SignalPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.weight).collect()
    }
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// A trading strategy: price history in, target position per date out.
///
/// Implementations must be pure and deterministic. Any lookback state lives
/// inside a single `evaluate` call.
pub trait AlphaSignal: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, series: &PriceSeries) -> PositionSignal;

    fn gap_policy(&self) -> GapPolicy {
        GapPolicy::Preserve
    }
}
