//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::price_cache::{CachedPriceStore, DEFAULT_MAX_ENTRIES};
use crate::domain::alpha::AlphaSpec;
use crate::domain::backtest::{BacktestRequest, BacktestResult, EngineConfig, parse_date};
use crate::domain::config_validation::{backend, validate_backtest_config, validate_data_config};
use crate::domain::error::BacktestError;
use crate::domain::orchestrator::BacktestOrchestrator;
use crate::domain::universe::parse_instrument_list;
use crate::ports::catalog_port::InstrumentCatalog;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSeriesStore;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Parser, Debug)]
#[command(name = "alphatest", about = "Alpha signal backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated FIGIs or tickers; overrides [backtest] instruments
        #[arg(short, long)]
        instruments: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// buy_and_hold, alpha1[:V,A], sma_crossover:F,S[,short] or expr:<expression>
        #[arg(short, long)]
        alpha: Option<String>,
        /// Print the JSON response to stdout
        #[arg(long)]
        json: bool,
        /// Include the equity curve in the output
        #[arg(long)]
        curve: bool,
    },
    /// List the instrument catalog
    Instruments {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Parse an alpha spec and print its canonical form
    Validate {
        #[arg(short, long)]
        alpha: String,
    },
    /// Start the HTTP server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Command-line values that take precedence over the `[backtest]` section.
#[derive(Debug, Default, Clone)]
pub struct RequestOverrides {
    pub instruments: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub alpha: Option<String>,
    pub include_curve: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            instruments,
            start,
            end,
            alpha,
            json,
            curve,
        } => {
            let overrides = RequestOverrides {
                instruments,
                start,
                end,
                alpha,
                include_curve: curve,
            };
            run_backtest(&config, &overrides, json)
        }
        Command::Instruments { config } => run_instruments(&config),
        Command::Validate { alpha } => run_validate(&alpha),
        Command::Serve { config } => run_serve(&config),
    }
}

fn fail(err: &BacktestError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, BacktestError> {
    tracing::debug!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Catalog and price store selected by `[data] backend`.
pub struct Stores {
    pub catalog: Arc<dyn InstrumentCatalog>,
    pub store: Arc<dyn PriceSeriesStore>,
}

pub fn build_stores(config: &dyn ConfigPort) -> Result<Stores, BacktestError> {
    validate_data_config(config)?;

    let (catalog, store): (Arc<dyn InstrumentCatalog>, Arc<dyn PriceSeriesStore>) =
        match backend(config)?.as_str() {
            "csv" => {
                let dir = config.get_non_empty("data", "csv_dir").ok_or_else(|| {
                    BacktestError::ConfigMissing {
                        section: "data".into(),
                        key: "csv_dir".into(),
                    }
                })?;
                let adapter = Arc::new(CsvAdapter::new(PathBuf::from(dir)));
                (
                    adapter.clone() as Arc<dyn InstrumentCatalog>,
                    adapter as Arc<dyn PriceSeriesStore>,
                )
            }
            other => open_sqlite(config, other)?,
        };

    let store: Arc<dyn PriceSeriesStore> = if config.get_bool("cache", "enabled", false) {
        let max_entries = config.get_int("cache", "max_entries", DEFAULT_MAX_ENTRIES as i64);
        tracing::info!(max_entries, "price cache enabled");
        Arc::new(CachedPriceStore::new(store, max_entries.max(1) as usize))
    } else {
        store
    };

    Ok(Stores { catalog, store })
}

#[cfg(feature = "sqlite")]
fn open_sqlite(
    config: &dyn ConfigPort,
    _backend: &str,
) -> Result<(Arc<dyn InstrumentCatalog>, Arc<dyn PriceSeriesStore>), BacktestError> {
    let adapter = Arc::new(crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?);
    Ok((
        adapter.clone() as Arc<dyn InstrumentCatalog>,
        adapter as Arc<dyn PriceSeriesStore>,
    ))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(
    _config: &dyn ConfigPort,
    backend: &str,
) -> Result<(Arc<dyn InstrumentCatalog>, Arc<dyn PriceSeriesStore>), BacktestError> {
    Err(BacktestError::ConfigInvalid {
        section: "data".into(),
        key: "backend".into(),
        reason: format!("backend '{backend}' requires the sqlite feature"),
    })
}

pub fn build_orchestrator(config: &dyn ConfigPort) -> Result<BacktestOrchestrator, BacktestError> {
    let engine = EngineConfig::from_config(config)?;
    let stores = build_stores(config)?;
    Ok(BacktestOrchestrator::new(stores.catalog, stores.store, engine))
}

fn request_date(
    flag: Option<&str>,
    config: &dyn ConfigPort,
    key: &str,
) -> Result<NaiveDate, BacktestError> {
    match flag {
        Some(raw) => parse_date(raw).map_err(|reason| BacktestError::invalid_request(key, reason)),
        None => {
            let raw =
                config
                    .get_non_empty("backtest", key)
                    .ok_or_else(|| BacktestError::ConfigMissing {
                        section: "backtest".into(),
                        key: key.into(),
                    })?;
            parse_date(&raw).map_err(|reason| BacktestError::ConfigInvalid {
                section: "backtest".into(),
                key: key.into(),
                reason,
            })
        }
    }
}

/// Merge the `[backtest]` section with command-line overrides.
pub fn build_request(
    config: &dyn ConfigPort,
    overrides: &RequestOverrides,
) -> Result<BacktestRequest, BacktestError> {
    validate_backtest_config(config)?;

    let list = match &overrides.instruments {
        Some(list) => list.clone(),
        None => config.get_non_empty("backtest", "instruments").ok_or_else(|| {
            BacktestError::ConfigMissing {
                section: "backtest".into(),
                key: "instruments".into(),
            }
        })?,
    };
    let instruments = parse_instrument_list(&list)?;

    let start_date = request_date(overrides.start.as_deref(), config, "start_date")?;
    let end_date = request_date(overrides.end.as_deref(), config, "end_date")?;

    let alpha = match overrides
        .alpha
        .clone()
        .or_else(|| config.get_non_empty("backtest", "alpha"))
    {
        Some(raw) => raw.parse::<AlphaSpec>()?,
        None => AlphaSpec::default(),
    };
    alpha.build()?;

    Ok(BacktestRequest::new(instruments, start_date, end_date)
        .with_alpha(alpha)
        .with_curve(overrides.include_curve))
}

fn runtime() -> Result<tokio::runtime::Runtime, BacktestError> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Resolves on ctrl-c; never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn run_backtest(config_path: &PathBuf, overrides: &RequestOverrides, json: bool) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let request = match build_request(&config, overrides) {
        Ok(r) => r,
        Err(BacktestError::AlphaParse(e)) => {
            let source = overrides
                .alpha
                .clone()
                .or_else(|| config.get_non_empty("backtest", "alpha"))
                .unwrap_or_default();
            let expression = source.split_once(':').map(|(_, e)| e.trim()).unwrap_or("");
            eprintln!("error: failed to parse alpha:\n{}", e.display_with_context(expression));
            return (&BacktestError::AlphaParse(e)).into();
        }
        Err(e) => return fail(&e),
    };

    let orchestrator = match build_orchestrator(&config) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    eprintln!(
        "Running {} on {} instruments ({} to {})",
        request.alpha,
        request.instruments.len(),
        request.start_date,
        request.end_date
    );

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => return fail(&e),
    };
    let result = match rt.block_on(orchestrator.run_until(request, interrupted())) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_summary(&result);
    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(body) => println!("{body}"),
            Err(e) => {
                eprintln!("error: failed to encode result: {e}");
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}

fn format_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

pub fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== Results ===");
    eprintln!(
        "{:<16} {:>10} {:>8} {:>8} {:>10}",
        "Instrument", "Return", "Sharpe", "Sortino", "Max DD"
    );
    for entry in &result.results {
        match entry.summary() {
            Some(summary) => {
                let m = &summary.metrics;
                eprintln!(
                    "{:<16} {:>9.2}% {:>8} {:>8} {:>9.1}%",
                    entry.instrument,
                    m.total_return * 100.0,
                    format_ratio(m.sharpe_ratio),
                    format_ratio(m.sortino_ratio),
                    m.max_drawdown * 100.0
                );
            }
            None => eprintln!(
                "{:<16} {}",
                entry.instrument,
                entry.error_kind().unwrap_or("error")
            ),
        }
    }
    eprintln!(
        "\n{} succeeded, {} failed",
        result.success_count(),
        result.failure_count()
    );
}

fn run_instruments(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let stores = match build_stores(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match stores.catalog.list_all() {
        Ok(instruments) if instruments.is_empty() => {
            eprintln!("No instruments in catalog");
            ExitCode::SUCCESS
        }
        Ok(instruments) => {
            for i in &instruments {
                let span = match stores.store.data_range(&i.figi) {
                    Ok(range) => format_span(range),
                    Err(e) => return fail(&e),
                };
                println!("{}\t{}\t{}\t{}\t{}", i.figi, i.ticker, i.currency, span, i.name);
            }
            eprintln!("{} instruments found", instruments.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Stored history of one instrument, as printed by `instruments`.
pub fn format_span(range: Option<(NaiveDate, NaiveDate, usize)>) -> String {
    match range {
        Some((first, last, 1)) => format!("{first}..{last} (1 day)"),
        Some((first, last, count)) => format!("{first}..{last} ({count} days)"),
        None => "no data".to_string(),
    }
}

fn run_validate(alpha: &str) -> ExitCode {
    let spec: AlphaSpec = match alpha.parse() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    match spec.build() {
        Ok(signal) => {
            println!("{}", signal.name());
            ExitCode::SUCCESS
        }
        Err(BacktestError::AlphaParse(e)) => {
            let expression = match &spec {
                AlphaSpec::Expression { expression, .. } => expression.as_str(),
                _ => alpha,
            };
            eprintln!("error: failed to parse alpha:\n{}", e.display_with_context(expression));
            (&BacktestError::AlphaParse(e)).into()
        }
        Err(e) => fail(&e),
    }
}

fn run_serve(config_path: &PathBuf) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, serve};

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        };
        let orchestrator = match build_orchestrator(&config) {
            Ok(o) => o,
            Err(e) => return fail(&e),
        };
        let listen = config
            .get_non_empty("web", "listen")
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        eprintln!("Starting web server on {listen}");
        let rt = match runtime() {
            Ok(rt) => rt,
            Err(e) => return fail(&e),
        };
        match rt.block_on(serve(&listen, AppState { orchestrator })) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(&e),
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}
