//! CSV directory adapter: `instruments.csv` plus one `<FIGI>.csv` per instrument.

use crate::domain::error::BacktestError;
use crate::domain::instrument::Instrument;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::catalog_port::InstrumentCatalog;
use crate::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CATALOG_FILE: &str = "instruments.csv";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn series_path(&self, figi: &str) -> PathBuf {
        self.base_path.join(format!("{figi}.csv"))
    }

    fn read_points(&self, path: &Path) -> Result<Vec<PricePoint>, BacktestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| BacktestError::Database {
                reason: format!("failed to read {}: {e}", path.display()),
            })?;

        let mut points = Vec::new();
        for (line, row) in rdr.deserialize::<PricePoint>().enumerate() {
            let point = row.map_err(|e| BacktestError::DatabaseQuery {
                reason: format!("{} row {}: {e}", path.display(), line + 2),
            })?;
            points.push(point);
        }
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

impl InstrumentCatalog for CsvAdapter {
    fn list_all(&self) -> Result<Vec<Instrument>, BacktestError> {
        let path = self.base_path.join(CATALOG_FILE);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| BacktestError::Database {
                reason: format!("failed to read {}: {e}", path.display()),
            })?;

        let mut instruments = Vec::new();
        for (line, row) in rdr.deserialize::<Instrument>().enumerate() {
            let instrument = row.map_err(|e| BacktestError::DatabaseQuery {
                reason: format!("{} row {}: {e}", path.display(), line + 2),
            })?;
            instrument.validate().map_err(|reason| BacktestError::DatabaseQuery {
                reason: format!("{} row {}: {reason}", path.display(), line + 2),
            })?;
            instruments.push(instrument);
        }
        instruments.sort_by(|a, b| a.figi.cmp(&b.figi));
        Ok(instruments)
    }
}

impl PriceSeriesStore for CsvAdapter {
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError> {
        let path = self.series_path(figi);
        if !path.is_file() {
            return Err(BacktestError::UnknownInstrument {
                identifier: figi.to_string(),
            });
        }

        let points: Vec<PricePoint> = self
            .read_points(&path)?
            .into_iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .collect();
        debug!(figi, path = %path.display(), points = points.len(), "csv series loaded");

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
        let path = self.series_path(figi);
        if !path.is_file() {
            return Ok(None);
        }
        let points = self.read_points(&path)?;
        Ok(points
            .first()
            .zip(points.last())
            .map(|(first, last)| (first.date, last.date, points.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join(CATALOG_FILE),
            "figi,ticker,name,currency,lot,min_price_increment\n\
             BBG004730N88,SBER,Sberbank,rub,10,0.01\n\
             BBG004730RP0,GAZP,Gazprom,rub,10,0.01\n",
        )
        .unwrap();
        fs::write(
            path.join("BBG004730N88.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-17,110.0,120.0,105.0,115.0,55000\n\
             2024-01-15,100.0,110.0,90.0,105.0,50000\n\
             2024-01-16,,,,110.0,\n",
        )
        .unwrap();
        fs::write(path.join("BBG004730RP0.csv"), "date,close\n2024-01-15,160.5\n").unwrap();

        (dir, path)
    }

    #[test]
    fn list_all_reads_catalog() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let instruments = adapter.list_all().unwrap();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].ticker, "SBER");
        assert_eq!(instruments[0].lot, 10);
        assert_eq!(adapter.resolve("gazp").unwrap().figi, "BBG004730RP0");
    }

    #[test]
    fn fetch_series_sorts_and_allows_missing_columns() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter
            .fetch_series("BBG004730N88", d("2024-01-01"), d("2024-01-31"))
            .unwrap();
        assert_eq!(series.closes(), vec![105.0, 110.0, 115.0]);
        let points = series.points();
        assert_eq!(points[0].open, Some(100.0));
        assert_eq!(points[0].volume, Some(50000));
        assert_eq!(points[1].open, None);
        assert_eq!(points[1].volume, None);
    }

    #[test]
    fn fetch_series_close_only_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter
            .fetch_series("BBG004730RP0", d("2024-01-01"), d("2024-01-31"))
            .unwrap();
        assert_eq!(series.closes(), vec![160.5]);
    }

    #[test]
    fn fetch_series_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let series = adapter
            .fetch_series("BBG004730N88", d("2024-01-16"), d("2024-01-16"))
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first_date(), Some(d("2024-01-16")));
    }

    #[test]
    fn fetch_series_outside_range_is_unavailable() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let err = adapter
            .fetch_series("BBG004730N88", d("2023-01-01"), d("2023-12-31"))
            .unwrap_err();
        assert!(matches!(err, BacktestError::DataUnavailable { .. }));
    }

    #[test]
    fn fetch_series_missing_file_is_unknown() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let err = adapter
            .fetch_series("XYZ", d("2024-01-01"), d("2024-01-31"))
            .unwrap_err();
        assert!(matches!(err, BacktestError::UnknownInstrument { .. }));
    }

    #[test]
    fn malformed_row_reports_line() {
        let (_dir, path) = setup_test_data();
        fs::write(path.join("BAD.csv"), "date,close\n2024-01-15,abc\n").unwrap();
        let adapter = CsvAdapter::new(path);

        let err = adapter
            .fetch_series("BAD", d("2024-01-01"), d("2024-01-31"))
            .unwrap_err();
        match err {
            BacktestError::DatabaseQuery { reason } => assert!(reason.contains("row 2")),
            other => panic!("expected DatabaseQuery, got {other:?}"),
        }
    }

    #[test]
    fn data_range_reports_span() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(
            adapter.data_range("BBG004730N88").unwrap(),
            Some((d("2024-01-15"), d("2024-01-17"), 3))
        );
        assert_eq!(adapter.data_range("XYZ").unwrap(), None);
    }

    #[test]
    fn missing_catalog_is_database_error() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(matches!(adapter.list_all(), Err(BacktestError::Database { .. })));
    }
}
