//! Price history port.

use crate::domain::error::BacktestError;
use crate::domain::price::PriceSeries;
use chrono::NaiveDate;

pub trait PriceSeriesStore: Send + Sync {
    /// Daily series for `figi` with `start_date <= date <= end_date`.
    ///
    /// Fails with `DataUnavailable` when nothing falls in the range and with
    /// `UnknownInstrument` when the store has never heard of `figi`. Gaps are
    /// returned as they are.
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError>;

    /// First and last stored date plus the number of points, if any.
    fn data_range(&self, figi: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError>;
}
