//! In-memory catalog and price store.

use crate::domain::error::BacktestError;
use crate::domain::instrument::Instrument;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::catalog_port::InstrumentCatalog;
use crate::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    instruments: Vec<Instrument>,
    series: HashMap<String, PriceSeries>,
}

/// Catalog plus price history held in process memory.
#[derive(Default)]
pub struct InMemoryAdapter {
    inner: RwLock<Inner>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument, replacing any previous entry with the same FIGI.
    pub fn add_instrument(&self, instrument: Instrument) -> Result<(), BacktestError> {
        instrument
            .validate()
            .map_err(|reason| BacktestError::invalid_request("instrument", reason))?;
        let mut inner = self.write()?;
        inner.instruments.retain(|i| i.figi != instrument.figi);
        inner.instruments.push(instrument);
        Ok(())
    }

    /// Register an instrument together with its full price history.
    pub fn add_series(
        &self,
        instrument: Instrument,
        points: Vec<PricePoint>,
    ) -> Result<(), BacktestError> {
        let series = PriceSeries::new(instrument.figi.clone(), points)?;
        let figi = instrument.figi.clone();
        self.add_instrument(instrument)?;
        self.write()?.series.insert(figi, series);
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, BacktestError> {
        self.inner.write().map_err(|_| BacktestError::Database {
            reason: "in-memory store lock poisoned".into(),
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, BacktestError> {
        self.inner.read().map_err(|_| BacktestError::Database {
            reason: "in-memory store lock poisoned".into(),
        })
    }
}

impl InstrumentCatalog for InMemoryAdapter {
    fn list_all(&self) -> Result<Vec<Instrument>, BacktestError> {
        let mut instruments = self.read()?.instruments.clone();
        instruments.sort_by(|a, b| a.figi.cmp(&b.figi));
        Ok(instruments)
    }
}

impl PriceSeriesStore for InMemoryAdapter {
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError> {
        let inner = self.read()?;
        let series = inner
            .series
            .get(figi)
            .ok_or_else(|| BacktestError::UnknownInstrument {
                identifier: figi.to_string(),
            })?;
        let points: Vec<PricePoint> = series
            .points()
            .iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .cloned()
            .collect();
        if points.is_empty() {
            return Err(BacktestError::DataUnavailable {
                instrument: figi.to_string(),
                start_date,
                end_date,
            });
        }
        PriceSeries::new(figi, points)
    }

    fn data_range(&self, figi: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        let inner = self.read()?;
        Ok(inner.series.get(figi).and_then(|s| {
            s.first_date()
                .zip(s.last_date())
                .map(|(first, last)| (first, last, s.len()))
        }))
    }
}
