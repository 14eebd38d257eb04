#![allow(dead_code)]

use alphatest::domain::backtest::{BacktestRequest, EngineConfig};
use alphatest::domain::error::BacktestError;
use alphatest::domain::instrument::Instrument;
pub use alphatest::domain::price::{PricePoint, PriceSeries};
use alphatest::domain::orchestrator::BacktestOrchestrator;
use alphatest::ports::catalog_port::InstrumentCatalog;
use alphatest::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Catalog plus store with per-FIGI latency, error and panic injection.
#[derive(Default)]
pub struct MockMarket {
    pub instruments: Vec<Instrument>,
    pub prices: HashMap<String, Vec<PricePoint>>,
    pub latency: HashMap<String, Duration>,
    pub errors: HashMap<String, String>,
    pub panics: Vec<String>,
    pub fetches: AtomicUsize,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, figi: &str, ticker: &str, closes: &[f64]) -> Self {
        self.instruments.push(make_instrument(figi, ticker));
        self.prices
            .insert(figi.to_string(), make_points("2024-01-01", closes));
        self
    }

    pub fn with_points(mut self, figi: &str, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.instruments.push(make_instrument(figi, ticker));
        self.prices.insert(figi.to_string(), points);
        self
    }

    pub fn with_latency(mut self, figi: &str, latency: Duration) -> Self {
        self.latency.insert(figi.to_string(), latency);
        self
    }

    pub fn with_error(mut self, figi: &str, reason: &str) -> Self {
        self.errors.insert(figi.to_string(), reason.to_string());
        self
    }

    pub fn with_panic(mut self, figi: &str) -> Self {
        self.panics.push(figi.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl InstrumentCatalog for MockMarket {
    fn list_all(&self) -> Result<Vec<Instrument>, BacktestError> {
        Ok(self.instruments.clone())
    }
}

impl PriceSeriesStore for MockMarket {
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency.get(figi) {
            std::thread::sleep(*latency);
        }
        if self.panics.iter().any(|p| p == figi) {
            panic!("injected panic for {figi}");
        }
        if let Some(reason) = self.errors.get(figi) {
            return Err(BacktestError::Database {
                reason: reason.clone(),
            });
        }
        let points: Vec<PricePoint> = self
            .prices
            .get(figi)
            .ok_or_else(|| BacktestError::UnknownInstrument {
                identifier: figi.to_string(),
            })?
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
        Ok(self.prices.get(figi).and_then(|p| {
            Some((p.first()?.date, p.last()?.date, p.len()))
        }))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn parse_day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_instrument(figi: &str, ticker: &str) -> Instrument {
    Instrument {
        figi: figi.to_string(),
        ticker: ticker.to_string(),
        name: format!("{ticker} Corp"),
        currency: "usd".to_string(),
        lot: 1,
        min_price_increment: 0.01,
    }
}

/// Consecutive calendar days starting at `start`.
pub fn make_points(start: &str, closes: &[f64]) -> Vec<PricePoint> {
    let start = parse_day(start);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint::close_only(start + chrono::Duration::days(i as i64), close))
        .collect()
}

/// A deterministic zig-zag walk, strictly positive.
pub fn generate_closes(n: usize, start: f64) -> Vec<f64> {
    (0..n)
        .map(|i| start * (1.0 + 0.01 * ((i * 7 % 11) as f64 - 5.0) / 5.0) + i as f64 * 0.1)
        .collect()
}

pub fn request(ids: &[&str]) -> BacktestRequest {
    BacktestRequest::new(
        ids.iter().map(|s| s.to_string()).collect(),
        date(2024, 1, 1),
        date(2024, 12, 31),
    )
}

pub fn engine(max_workers: usize) -> EngineConfig {
    EngineConfig {
        max_workers,
        ..EngineConfig::default()
    }
}

pub fn orchestrator(market: MockMarket, config: EngineConfig) -> (Arc<MockMarket>, BacktestOrchestrator) {
    let market = Arc::new(market);
    let orchestrator = BacktestOrchestrator::new(
        market.clone() as Arc<dyn InstrumentCatalog>,
        market.clone() as Arc<dyn PriceSeriesStore>,
        config,
    );
    (market, orchestrator)
}
