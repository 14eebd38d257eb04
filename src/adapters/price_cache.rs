//! Bounded price cache wrapping any [`PriceSeriesStore`].

use crate::domain::error::BacktestError;
use crate::domain::price::PriceSeries;
use crate::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const DEFAULT_MAX_ENTRIES: usize = 256;

type CacheKey = (String, NaiveDate, NaiveDate);

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, PriceSeries>,
    /// Insertion order, oldest first.
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// Keyed by `(figi, start, end)`. Only successful fetches are cached; when
/// full, the oldest entry is evicted.
pub struct CachedPriceStore {
    inner: Arc<dyn PriceSeriesStore>,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl CachedPriceStore {
    pub fn new(inner: Arc<dyn PriceSeriesStore>, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        self.lock().map(|s| (s.hits, s.misses)).unwrap_or((0, 0))
    }

    /// Drop every cached range for one instrument.
    pub fn invalidate(&self, figi: &str) -> Result<(), BacktestError> {
        let mut state = self.lock()?;
        state.entries.retain(|key, _| key.0 != figi);
        state.order.retain(|key| key.0 != figi);
        debug!(figi, "price cache invalidated");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), BacktestError> {
        let mut state = self.lock()?;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, BacktestError> {
        self.state.lock().map_err(|_| BacktestError::Database {
            reason: "price cache lock poisoned".into(),
        })
    }
}

impl PriceSeriesStore for CachedPriceStore {
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError> {
        let key = (figi.to_string(), start_date, end_date);
        {
            let mut state = self.lock()?;
            if let Some(series) = state.entries.get(&key).cloned() {
                state.hits += 1;
                return Ok(series);
            }
            state.misses += 1;
        }

        // lock is not held across the inner fetch
        let series = self.inner.fetch_series(figi, start_date, end_date)?;

        let mut state = self.lock()?;
        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.max_entries {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
            }
            state.order.push_back(key.clone());
            state.entries.insert(key, series.clone());
        }
        Ok(series)
    }

    fn data_range(&self, figi: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        self.inner.data_range(figi)
    }
}
