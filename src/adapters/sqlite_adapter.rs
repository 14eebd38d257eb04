//! SQLite catalog and price store.

use crate::domain::error::BacktestError;
use crate::domain::instrument::Instrument;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::catalog_port::InstrumentCatalog;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> BacktestError {
    BacktestError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_stored_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BacktestError> {
        let db_path =
            config
                .get_non_empty("sqlite", "path")
                .ok_or_else(|| BacktestError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| BacktestError::Database {
                reason: e.to_string(),
            })?;
        info!(path = %db_path, pool_size, "sqlite pool opened");

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// Single-connection in-memory database.
    pub fn in_memory() -> Result<Self, BacktestError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| BacktestError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, BacktestError> {
        self.pool.get().map_err(|e: r2d2::Error| BacktestError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), BacktestError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS instruments (
                figi TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                name TEXT NOT NULL,
                currency TEXT NOT NULL,
                lot INTEGER NOT NULL,
                min_price_increment REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_instruments_ticker ON instruments(ticker COLLATE NOCASE);
            CREATE TABLE IF NOT EXISTS prices (
                figi TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL NOT NULL,
                volume INTEGER,
                PRIMARY KEY (figi, date)
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_instruments(&self, instruments: &[Instrument]) -> Result<(), BacktestError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for instrument in instruments {
            instrument
                .validate()
                .map_err(|reason| BacktestError::invalid_request("instrument", reason))?;
            tx.execute(
                "INSERT OR REPLACE INTO instruments (figi, ticker, name, currency, lot, min_price_increment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    instrument.figi,
                    instrument.ticker,
                    instrument.name,
                    instrument.currency,
                    instrument.lot,
                    instrument.min_price_increment
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// Upsert price points for one instrument in a single transaction.
    pub fn insert_prices(&self, figi: &str, points: &[PricePoint]) -> Result<(), BacktestError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for point in points {
            point.check().map_err(|reason| BacktestError::InvalidPriceData {
                instrument: figi.to_string(),
                date: point.date,
                reason,
            })?;
            tx.execute(
                "INSERT OR REPLACE INTO prices (figi, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    figi,
                    point.date.format(DATE_FORMAT).to_string(),
                    point.open,
                    point.high,
                    point.low,
                    point.close,
                    point.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        debug!(figi, points = points.len(), "prices stored");
        Ok(())
    }

    fn knows(&self, figi: &str) -> Result<bool, BacktestError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM instruments WHERE figi = ?1)
                      + (SELECT COUNT(*) FROM prices WHERE figi = ?1)",
                params![figi],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(count > 0)
    }
}

impl InstrumentCatalog for SqliteAdapter {
    fn list_all(&self) -> Result<Vec<Instrument>, BacktestError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT figi, ticker, name, currency, lot, min_price_increment
                 FROM instruments ORDER BY figi",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Instrument {
                    figi: row.get(0)?,
                    ticker: row.get(1)?,
                    name: row.get(2)?,
                    currency: row.get(3)?,
                    lot: row.get(4)?,
                    min_price_increment: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl PriceSeriesStore for SqliteAdapter {
    fn fetch_series(
        &self,
        figi: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, BacktestError> {
        let points = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT date, open, high, low, close, volume
                     FROM prices
                     WHERE figi = ?1 AND date >= ?2 AND date <= ?3
                     ORDER BY date ASC",
                )
                .map_err(query_err)?;

            let rows = stmt
                .query_map(
                    params![
                        figi,
                        start_date.format(DATE_FORMAT).to_string(),
                        end_date.format(DATE_FORMAT).to_string()
                    ],
                    |row| {
                        let date: String = row.get(0)?;
                        Ok(PricePoint {
                            date: parse_stored_date(&date)?,
                            open: row.get(1)?,
                            high: row.get(2)?,
                            low: row.get(3)?,
                            close: row.get(4)?,
                            volume: row.get(5)?,
                        })
                    },
                )
                .map_err(query_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?
        };

        if points.is_empty() {
            return Err(if self.knows(figi)? {
                BacktestError::DataUnavailable {
                    instrument: figi.to_string(),
                    start_date,
                    end_date,
                }
            } else {
                BacktestError::UnknownInstrument {
                    identifier: figi.to_string(),
                }
            });
        }
        PriceSeries::new(figi, points)
    }

    fn data_range(&self, figi: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE figi = ?1",
                params![figi],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => Ok(Some((
                parse_stored_date(&min).map_err(query_err)?,
                parse_stored_date(&max).map_err(query_err)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }
}
