//! Reference strategy: fully long on every date.

use crate::domain::price::PriceSeries;
use crate::domain::signal::{AlphaSignal, PositionSignal};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl AlphaSignal for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn evaluate(&self, series: &PriceSeries) -> PositionSignal {
        PositionSignal::constant(series, 1.0)
    }
}
