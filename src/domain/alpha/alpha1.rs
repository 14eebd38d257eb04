//! The "alpha #1" signal from the 101 Formulaic Alphas family.
//!
//! ```text
//! x = returns < 0 ? stddev(returns, V) : close
//! weight = rank(ts_argmax(signedpower(x, 2), A)) - 0.5
//! ```
//!
//! Both windows cover the periods before the current date (the current
//! observation is excluded), and the rank is an expanding percentile rank so
//! no weight depends on later prices.

use crate::domain::expression_eval::signed_power;
use crate::domain::price::PriceSeries;
use crate::domain::rolling;
use crate::domain::signal::{AlphaSignal, PositionSignal};

#[derive(Debug, Clone)]
pub struct Alpha1 {
    volatility_window: usize,
    argmax_window: usize,
    name: String,
}

impl Alpha1 {
    pub fn new(volatility_window: usize, argmax_window: usize) -> Self {
        Self {
            volatility_window,
            argmax_window,
            name: format!("alpha1:{volatility_window},{argmax_window}"),
        }
    }

    pub fn raw_weights(&self, closes: &[f64]) -> Vec<f64> {
        let returns = rolling::pct_change(closes);
        let volatility = rolling::delay(&rolling::stddev(&returns, self.volatility_window, 1), 1);

        let powered: Vec<f64> = returns
            .iter()
            .zip(&volatility)
            .zip(closes)
            .map(|((&r, &vol), &close)| {
                let x = if r < 0.0 { vol } else { close };
                signed_power(x, 2.0)
            })
            .collect();

        let argmax = rolling::delay(&rolling::ts_argmax(&powered, self.argmax_window), 1);
        rolling::expanding_pct_rank(&argmax)
            .into_iter()
            .map(|r| r - 0.5)
            .collect()
    }
}

impl AlphaSignal for Alpha1 {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, series: &PriceSeries) -> PositionSignal {
        PositionSignal::from_raw(series, &self.raw_weights(&series.closes()))
    }
}
