//! Performance metrics and statistics.

use crate::domain::returns::ReturnSeries;
use chrono::NaiveDate;
use serde::Serialize;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Relative tolerance below which a standard deviation is treated as zero.
const ZERO_VOLATILITY_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    pub annualization_factor: f64,
    /// Annual rate, converted to a per-period rate internally.
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            annualization_factor: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub period_return: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    /// Cumulative return over the whole series, E(n) - 1.
    #[serde(rename = "returns")]
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub periods: usize,
}

impl RiskMetrics {
    pub fn compute(returns: &ReturnSeries, config: &MetricsConfig) -> Self {
        let values = returns.values();
        let ann = config.annualization_factor;
        let periods = values.len();

        let equity = equity_curve(&values);
        let final_equity = equity.last().copied().unwrap_or(1.0);
        let total_return = final_equity - 1.0;

        let annualized_return = if periods == 0 {
            0.0
        } else if final_equity <= 0.0 {
            -1.0
        } else {
            final_equity.powf(ann / periods as f64) - 1.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&equity);

        let per_period_rf = config.risk_free_rate / ann;
        let stddev = population_stddev(&values);
        let annualized_volatility = stddev.map(|s| s * ann.sqrt()).unwrap_or(0.0);

        RiskMetrics {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio: sharpe_ratio(&values, ann, per_period_rf),
            sortino_ratio: sortino_ratio(&values, ann, per_period_rf),
            max_drawdown,
            max_drawdown_duration,
            periods,
        }
    }
}

/// E(0) = 1, E(i) = E(i-1) * (1 + r(i)), multiplied strictly in order.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = 1.0_f64;
    curve.push(equity);
    for r in returns {
        equity *= 1.0 + r;
        curve.push(equity);
    }
    curve
}

/// Equity curve paired with return dates; the first point sits at `start`.
pub fn dated_equity_curve(start: NaiveDate, returns: &ReturnSeries) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = 1.0_f64;
    curve.push(EquityPoint {
        date: start,
        period_return: 0.0,
        equity,
    });
    for point in &returns.points {
        equity *= 1.0 + point.value;
        curve.push(EquityPoint {
            date: point.date,
            period_return: point.value,
            equity,
        });
    }
    curve
}

/// Most negative (E - peak) / peak over the curve and the longest run below a peak.
///
/// Returns `(0.0, 0)` for an empty or never-declining curve.
pub fn compute_drawdown(equity_curve: &[f64]) -> (f64, usize) {
    let Some(&first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0usize;
    let mut max_duration = 0usize;

    for &equity in equity_curve {
        if equity >= peak {
            peak = equity;
            current_duration = 0;
            continue;
        }
        if peak > 0.0 {
            let dd = (equity - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
        current_duration += 1;
        if current_duration > max_duration {
            max_duration = current_duration;
        }
    }

    (max_dd, max_duration)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn population_stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|r| (r - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

fn is_effectively_zero(stddev: f64, scale: f64) -> bool {
    stddev <= ZERO_VOLATILITY_TOLERANCE * scale.abs().max(1.0)
}

/// Annualized Sharpe ratio, `None` when the returns have no variance.
pub fn sharpe_ratio(returns: &[f64], annualization_factor: f64, per_period_rf: f64) -> Option<f64> {
    let m = mean(returns)?;
    let stddev = population_stddev(returns)?;
    if is_effectively_zero(stddev, m) {
        return None;
    }
    Some((m - per_period_rf) / stddev * annualization_factor.sqrt())
}

/// Annualized Sortino ratio using downside deviation below the risk-free rate.
pub fn sortino_ratio(returns: &[f64], annualization_factor: f64, per_period_rf: f64) -> Option<f64> {
    let m = mean(returns)?;
    let n = returns.len() as f64;
    let downside_var = returns
        .iter()
        .filter(|&&r| r < per_period_rf)
        .map(|&r| (r - per_period_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside = downside_var.sqrt();
    if is_effectively_zero(downside, m) {
        return None;
    }
    Some((m - per_period_rf) / downside * annualization_factor.sqrt())
}
