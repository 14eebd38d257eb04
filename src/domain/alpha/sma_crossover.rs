//! Moving average crossover: long while the fast SMA is above the slow SMA.

use crate::domain::price::PriceSeries;
use crate::domain::rolling;
use crate::domain::signal::{AlphaSignal, PositionSignal};

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast_window: usize,
    slow_window: usize,
    allow_short: bool,
    name: String,
}

impl SmaCrossover {
    /// Callers validate `0 < fast_window < slow_window`; see `AlphaSpec::build`.
    pub fn new(fast_window: usize, slow_window: usize, allow_short: bool) -> Self {
        let name = if allow_short {
            format!("sma_crossover:{fast_window},{slow_window},short")
        } else {
            format!("sma_crossover:{fast_window},{slow_window}")
        };
        Self {
            fast_window,
            slow_window,
            allow_short,
            name,
        }
    }

    fn weight(&self, fast: f64, slow: f64) -> f64 {
        if fast.is_nan() || slow.is_nan() {
            // warm-up
            0.0
        } else if fast > slow {
            1.0
        } else if self.allow_short {
            -1.0
        } else {
            0.0
        }
    }
}

impl AlphaSignal for SmaCrossover {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, series: &PriceSeries) -> PositionSignal {
        let closes = series.closes();
        let fast = rolling::mean(&closes, self.fast_window);
        let slow = rolling::mean(&closes, self.slow_window);
        let raw: Vec<f64> = fast
            .iter()
            .zip(&slow)
            .map(|(&f, &s)| self.weight(f, s))
            .collect();
        PositionSignal::from_raw(series, &raw)
    }
}
