//! Backtest orchestration: validation, bounded fan-out, aggregation.
//!
//! A run moves through `Validating -> Fetching -> Computing -> Aggregating ->
//! Done`, or to `Failed` from any non-terminal state. Each instrument is
//! fetched and computed independently on a bounded pool of workers; a failure
//! is recorded in that instrument's slot and never touches the others.
//!
//! Pool shape: `min(max_workers, n)` tokio tasks pull slot indices from a
//! shared cursor and run the synchronous work on the blocking pool. Results
//! are sent back tagged with their index, so result order is request order no
//! matter which worker finishes first.

use crate::domain::backtest::{
    BacktestRequest, BacktestResult, EngineConfig, InstrumentOutcome, InstrumentResult,
    PerformanceSummary,
};
use crate::domain::error::BacktestError;
use crate::domain::instrument::Instrument;
use crate::domain::metrics::{MetricsConfig, RiskMetrics, dated_equity_curve};
use crate::domain::price::PriceSeries;
use crate::domain::returns::{MIN_PRICE_POINTS, ReturnsCalculator};
use crate::domain::signal::{AlphaSignal, GapPolicy};
use crate::domain::universe::INSTRUMENTS_FIELD;
use crate::ports::catalog_port::InstrumentCatalog;
use crate::ports::price_port::PriceSeriesStore;
use chrono::NaiveDate;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Fetching,
    Computing,
    Aggregating,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Validating, Fetching)
            | (Fetching, Computing)
            | (Computing, Aggregating)
            | (Aggregating, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Validating => "validating",
            RunState::Fetching => "fetching",
            RunState::Computing => "computing",
            RunState::Aggregating => "aggregating",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of a single run; every transition is checked and logged.
#[derive(Debug)]
pub struct RunTracker {
    state: RunState,
    history: Vec<RunState>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            state: RunState::Validating,
            history: vec![RunState::Validating],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), BacktestError> {
        if !self.state.can_transition_to(next) {
            return Err(BacktestError::StateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "run state transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!(from = %self.state, "run failed");
            self.state = RunState::Failed;
            self.history.push(RunState::Failed);
        }
    }
}

type SlotResult<T> = Result<T, BacktestError>;

/// Run `job` over `items` on at most `max_workers` concurrent blocking tasks.
///
/// Each item carries a label used when its job panics. The output has one
/// entry per item, in item order. Dropping the returned future aborts the
/// worker tasks; blocking jobs already started run to completion and their
/// results are discarded.
pub async fn run_bounded<T, R, F>(max_workers: usize, items: Vec<(String, T)>, job: F) -> Vec<SlotResult<R>>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&T) -> SlotResult<R> + Send + Sync + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let items = Arc::new(items);
    let job = Arc::new(job);
    let cursor = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::channel::<(usize, SlotResult<R>)>(total);

    let mut workers = JoinSet::new();
    for _ in 0..max_workers.clamp(1, total) {
        let items = Arc::clone(&items);
        let job = Arc::clone(&job);
        let cursor = Arc::clone(&cursor);
        let tx = tx.clone();
        workers.spawn(async move {
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                if index >= total {
                    break;
                }
                let label = items[index].0.clone();
                let task_items = Arc::clone(&items);
                let task_job = Arc::clone(&job);
                let outcome =
                    match tokio::task::spawn_blocking(move || task_job(&task_items[index].1)).await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(BacktestError::WorkerFailed {
                            instrument: label,
                            reason: e.to_string(),
                        }),
                    };
                if tx.send((index, outcome)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut slots: Vec<Option<SlotResult<R>>> = (0..total).map(|_| None).collect();
    while let Some((index, outcome)) = rx.recv().await {
        slots[index] = Some(outcome);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                Err(BacktestError::WorkerFailed {
                    instrument: items[index].0.clone(),
                    reason: "worker exited before reporting".to_string(),
                })
            })
        })
        .collect()
}

/// Resolve, fetch and (if the alpha asks for it) gap-fill one instrument.
pub fn fetch_instrument(
    catalog: &dyn InstrumentCatalog,
    store: &dyn PriceSeriesStore,
    identifier: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    gap_policy: GapPolicy,
) -> Result<(Instrument, PriceSeries), BacktestError> {
    let instrument = catalog.resolve(identifier)?;
    let series = store.fetch_series(&instrument.figi, start_date, end_date)?;
    if series.is_empty() {
        return Err(BacktestError::DataUnavailable {
            instrument: instrument.figi.clone(),
            start_date,
            end_date,
        });
    }
    let series = match gap_policy {
        GapPolicy::Preserve => series,
        GapPolicy::ForwardFill => series.forward_filled(),
    };
    debug!(
        instrument = %identifier,
        figi = %instrument.figi,
        points = series.len(),
        "price series fetched"
    );
    Ok((instrument, series))
}

/// Signal, returns and metrics for one fetched instrument.
pub fn compute_instrument(
    alpha: &dyn AlphaSignal,
    calculator: &ReturnsCalculator,
    metrics_config: &MetricsConfig,
    include_curve: bool,
    instrument: &Instrument,
    series: &PriceSeries,
) -> Result<PerformanceSummary, BacktestError> {
    let signal = alpha.evaluate(series);
    let returns = calculator.compute(series, &signal)?;
    let (Some(first_date), Some(last_date)) = (series.first_date(), series.last_date()) else {
        return Err(BacktestError::InsufficientData {
            instrument: instrument.figi.clone(),
            points: series.len(),
            minimum: MIN_PRICE_POINTS,
        });
    };
    let metrics = RiskMetrics::compute(&returns, metrics_config);
    debug!(
        figi = %instrument.figi,
        periods = metrics.periods,
        "metrics computed"
    );

    Ok(PerformanceSummary {
        figi: instrument.figi.clone(),
        ticker: instrument.ticker.clone(),
        currency: instrument.currency.clone(),
        alpha: alpha.name().to_string(),
        first_date,
        last_date,
        metrics,
        equity_curve: include_curve.then(|| dated_equity_curve(first_date, &returns)),
    })
}

struct FetchJob {
    identifier: String,
}

struct ComputeJob {
    slot: usize,
    instrument: Instrument,
    series: PriceSeries,
}

pub struct BacktestOrchestrator {
    catalog: Arc<dyn InstrumentCatalog>,
    store: Arc<dyn PriceSeriesStore>,
    config: EngineConfig,
}

impl BacktestOrchestrator {
    pub fn new(
        catalog: Arc<dyn InstrumentCatalog>,
        store: Arc<dyn PriceSeriesStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn InstrumentCatalog> {
        &self.catalog
    }

    pub async fn run(&self, request: BacktestRequest) -> Result<BacktestResult, BacktestError> {
        self.run_until(request, std::future::pending::<()>()).await
    }

    /// Run the backtest, failing with `Cancelled` if `cancel` completes first.
    pub async fn run_until<C>(
        &self,
        request: BacktestRequest,
        cancel: C,
    ) -> Result<BacktestResult, BacktestError>
    where
        C: Future<Output = ()>,
    {
        let span = info_span!(
            "backtest",
            instruments = request.instruments.len(),
            start = %request.start_date,
            end = %request.end_date,
        );
        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner<C>(
        &self,
        request: BacktestRequest,
        cancel: C,
    ) -> Result<BacktestResult, BacktestError>
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut run = RunTracker::new();

        let alpha = match request.check().and_then(|()| request.alpha.build()) {
            Ok(alpha) => alpha,
            Err(e) => {
                run.fail();
                warn!(error = %e, "backtest request rejected");
                return Err(e);
            }
        };
        info!(alpha = alpha.name(), "backtest started");

        let outcome = {
            let work = self.collect(&mut run, &request, Arc::clone(&alpha));
            let limited = async {
                match self.config.timeout {
                    Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                        Err(BacktestError::Timeout {
                            seconds: limit.as_secs_f64(),
                        })
                    }),
                    None => work.await,
                }
            };
            tokio::select! {
                biased;
                _ = cancel => Err(BacktestError::Cancelled),
                result = limited => result,
            }
        };

        let slots = match outcome {
            Ok(slots) => slots,
            Err(e) => {
                run.fail();
                warn!(error = %e, "backtest aborted");
                return Err(e);
            }
        };

        run.advance(RunState::Aggregating)?;
        let unresolved = slots.iter().all(|slot| {
            matches!(
                slot,
                Err(BacktestError::UnknownInstrument { .. } | BacktestError::AmbiguousInstrument { .. })
            )
        });
        let results: Vec<InstrumentResult> = request
            .instruments
            .iter()
            .zip(slots)
            .map(|(identifier, slot)| InstrumentResult {
                instrument: identifier.clone(),
                outcome: match slot {
                    Ok(summary) => InstrumentOutcome::Success(summary),
                    Err(e) => {
                        warn!(instrument = %identifier, kind = e.kind(), error = %e, "instrument failed");
                        InstrumentOutcome::failure(&e)
                    }
                },
            })
            .collect();

        let result = BacktestResult { results };
        if result.success_count() == 0 {
            run.fail();
            let first = result
                .results
                .first()
                .and_then(|r| match &r.outcome {
                    InstrumentOutcome::Failure { message, .. } => Some(message.clone()),
                    InstrumentOutcome::Success(_) => None,
                })
                .unwrap_or_default();
            warn!(count = result.results.len(), "all instruments failed");
            if unresolved {
                return Err(BacktestError::invalid_request(
                    INSTRUMENTS_FIELD,
                    format!("no requested instrument could be resolved: {first}"),
                ));
            }
            return Err(BacktestError::AllInstrumentsFailed {
                count: result.results.len(),
                first,
            });
        }

        run.advance(RunState::Done)?;
        info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backtest finished"
        );
        Ok(result)
    }

    /// Everything between validation and aggregation: one result per slot.
    async fn collect(
        &self,
        run: &mut RunTracker,
        request: &BacktestRequest,
        alpha: Arc<dyn AlphaSignal>,
    ) -> Result<Vec<SlotResult<PerformanceSummary>>, BacktestError> {
        if self.config.strict_instruments {
            self.resolve_all(&request.instruments).await?;
        }

        run.advance(RunState::Fetching)?;
        let catalog = Arc::clone(&self.catalog);
        let store = Arc::clone(&self.store);
        let (start_date, end_date) = (request.start_date, request.end_date);
        let gap_policy = alpha.gap_policy();
        let fetch_items = request
            .instruments
            .iter()
            .map(|id| (id.clone(), FetchJob { identifier: id.clone() }))
            .collect();
        let fetched = run_bounded(self.config.max_workers, fetch_items, move |job: &FetchJob| {
            fetch_instrument(
                catalog.as_ref(),
                store.as_ref(),
                &job.identifier,
                start_date,
                end_date,
                gap_policy,
            )
        })
        .await;

        run.advance(RunState::Computing)?;
        let mut slots: Vec<SlotResult<PerformanceSummary>> = Vec::with_capacity(fetched.len());
        let mut compute_items = Vec::new();
        for (slot, fetch) in fetched.into_iter().enumerate() {
            match fetch {
                Ok((instrument, series)) => {
                    compute_items.push((
                        request.instruments[slot].clone(),
                        ComputeJob {
                            slot,
                            instrument,
                            series,
                        },
                    ));
                    // placeholder until the compute result arrives
                    slots.push(Err(BacktestError::WorkerFailed {
                        instrument: request.instruments[slot].clone(),
                        reason: "not computed".to_string(),
                    }));
                }
                Err(e) => slots.push(Err(e)),
            }
        }

        let targets: Vec<usize> = compute_items.iter().map(|(_, job)| job.slot).collect();
        let calculator = ReturnsCalculator::with_commission(self.config.commission_pct);
        let metrics_config = self.config.metrics;
        let include_curve = request.include_curve;
        let computed = run_bounded(self.config.max_workers, compute_items, move |job: &ComputeJob| {
            compute_instrument(
                alpha.as_ref(),
                &calculator,
                &metrics_config,
                include_curve,
                &job.instrument,
                &job.series,
            )
        })
        .await;

        for (slot, result) in targets.into_iter().zip(computed) {
            slots[slot] = result;
        }
        Ok(slots)
    }

    /// Strict mode: every identifier must resolve before any work starts.
    async fn resolve_all(&self, identifiers: &[String]) -> Result<(), BacktestError> {
        let catalog = Arc::clone(&self.catalog);
        let identifiers = identifiers.to_vec();
        let failures = tokio::task::spawn_blocking(move || {
            identifiers
                .iter()
                .filter_map(|id| catalog.resolve(id).err())
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| BacktestError::WorkerFailed {
            instrument: "catalog".to_string(),
            reason: e.to_string(),
        })?;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BacktestError::invalid_request("instruments", failures.join("; ")))
        }
    }
}
