//! End-to-end tests of the backtest orchestrator.
//!
//! Tests cover:
//! - The three-price reference example through the whole pipeline
//! - Result order under shuffled completion latencies
//! - Idempotence against unchanged data
//! - Per-instrument failure isolation (unknown, data errors, worker panics)
//! - Request-level failures: validation, timeout, cancellation, total failure
//! - Every alpha kind, gap forward-fill, injected price cache
//! - Catalog/store parity between the in-memory and SQLite adapters

mod common;

use alphatest::adapters::price_cache::CachedPriceStore;
use alphatest::domain::alpha::AlphaSpec;
use alphatest::domain::backtest::EngineConfig;
use alphatest::domain::error::BacktestError;
use alphatest::domain::orchestrator::BacktestOrchestrator;
use alphatest::ports::catalog_port::InstrumentCatalog;
use alphatest::ports::price_port::PriceSeriesStore;
use approx::assert_abs_diff_eq;
use common::*;
use std::sync::Arc;
use std::time::Duration;

mod reference_example {
    use super::*;

    #[tokio::test]
    async fn up_then_down() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 110.0, 99.0]);
        let (_, orch) = orchestrator(market, engine(2));

        let result = orch.run(request(&["FIGI_A"]).with_curve(true)).await.unwrap();
        assert_eq!(result.results.len(), 1);
        let summary = result.results[0].summary().unwrap();

        let curve = summary.equity_curve.as_ref().unwrap();
        let returns: Vec<f64> = curve.iter().skip(1).map(|p| p.period_return).collect();
        assert_abs_diff_eq!(returns[0], 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(returns[1], -0.10, epsilon = 1e-12);

        let equity: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        assert_abs_diff_eq!(equity[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(equity[1], 1.10, epsilon = 1e-12);
        assert_abs_diff_eq!(equity[2], 0.99, epsilon = 1e-12);

        assert_abs_diff_eq!(summary.metrics.max_drawdown, -0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.metrics.total_return, -0.01, epsilon = 1e-12);
        assert_eq!(summary.first_date, date(2024, 1, 1));
        assert_eq!(summary.last_date, date(2024, 1, 3));
        assert_eq!(summary.alpha, "buy_and_hold");
    }

    #[tokio::test]
    async fn constant_returns_have_no_sharpe() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &closes);
        let (_, orch) = orchestrator(market, engine(1));

        let result = orch.run(request(&["FIGI_A"])).await.unwrap();
        let metrics = &result.results[0].summary().unwrap().metrics;
        assert_eq!(metrics.sharpe_ratio, None);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert!(metrics.total_return > 0.0);
    }
}

mod ordering {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn result_order_matches_request_order(
            latencies in proptest::collection::vec(0u64..15, 1..8),
            workers in 1usize..5,
        ) {
            let mut market = MockMarket::new();
            let mut ids = Vec::new();
            for (i, ms) in latencies.iter().enumerate() {
                let figi = format!("FIGI_{i}");
                market = market
                    .with_series(&figi, &format!("T{i}"), &generate_closes(10, 50.0 + i as f64))
                    .with_latency(&figi, Duration::from_millis(*ms));
                ids.push(figi);
            }
            let (_, orch) = orchestrator(market, engine(workers));
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(orch.run(request(&id_refs))).unwrap();

            let returned: Vec<&str> = result.results.iter().map(|r| r.instrument.as_str()).collect();
            prop_assert_eq!(returned, id_refs.clone());
            for (entry, id) in result.results.iter().zip(&ids) {
                prop_assert_eq!(&entry.summary().unwrap().figi, id);
            }
        }
    }

    #[tokio::test]
    async fn slow_first_instrument_keeps_its_slot() {
        let market = MockMarket::new()
            .with_series("SLOW", "S", &[10.0, 11.0, 12.0])
            .with_series("FAST", "F", &[20.0, 19.0, 18.0])
            .with_latency("SLOW", Duration::from_millis(80));
        let (_, orch) = orchestrator(market, engine(2));

        let result = orch.run(request(&["SLOW", "FAST"])).await.unwrap();
        assert_eq!(result.results[0].instrument, "SLOW");
        assert_eq!(result.results[1].instrument, "FAST");
    }
}

mod determinism {
    use super::*;

    #[tokio::test]
    async fn identical_requests_give_identical_results() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &generate_closes(60, 100.0))
            .with_series("FIGI_B", "BBB", &generate_closes(60, 40.0));
        let (_, orch) = orchestrator(market, engine(4));
        let req = request(&["FIGI_A", "BBB"]).with_alpha(AlphaSpec::alpha1());

        let first = orch.run(req.clone()).await.unwrap();
        let second = orch.run(req).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

mod isolation {
    use super::*;

    #[tokio::test]
    async fn one_unknown_among_three() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0, 102.0])
            .with_series("FIGI_B", "BBB", &[50.0, 49.0, 51.0]);
        let (_, orch) = orchestrator(market, engine(3));

        let result = orch.run(request(&["AAA", "GHOST", "FIGI_B"])).await.unwrap();
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.results[1].instrument, "GHOST");
        assert_eq!(result.results[1].error_kind(), Some("UnknownInstrument"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["results"][1]["error"], "UnknownInstrument");
        assert!(json["results"][0].get("returns").is_some());
    }

    #[tokio::test]
    async fn store_error_is_isolated() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0])
            .with_series("FIGI_B", "BBB", &[100.0, 101.0])
            .with_error("FIGI_B", "connection reset");
        let (_, orch) = orchestrator(market, engine(2));

        let result = orch.run(request(&["FIGI_A", "FIGI_B"])).await.unwrap();
        assert!(result.results[0].is_success());
        assert_eq!(result.results[1].error_kind(), Some("DataSourceError"));
    }

    #[tokio::test]
    async fn worker_panic_is_isolated() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0])
            .with_series("BOOM", "BMB", &[100.0, 101.0])
            .with_series("FIGI_C", "CCC", &[100.0, 99.0])
            .with_panic("BOOM");
        let (_, orch) = orchestrator(market, engine(2));

        let result = orch.run(request(&["FIGI_A", "BOOM", "FIGI_C"])).await.unwrap();
        assert!(result.results[0].is_success());
        assert_eq!(result.results[1].error_kind(), Some("WorkerFailed"));
        assert!(result.results[2].is_success());
    }

    #[tokio::test]
    async fn out_of_range_and_short_series() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0])
            .with_series("ONE", "ONE", &[100.0])
            .with_points("OLD", "OLD", make_points("2020-01-01", &[1.0, 2.0]));
        let (_, orch) = orchestrator(market, engine(3));

        let result = orch.run(request(&["FIGI_A", "ONE", "OLD"])).await.unwrap();
        assert_eq!(result.results[1].error_kind(), Some("InsufficientData"));
        assert_eq!(result.results[2].error_kind(), Some("DataUnavailable"));
    }

    #[tokio::test]
    async fn all_failed_is_a_request_error() {
        let market = MockMarket::new().with_series("ONE", "ONE", &[100.0]);
        let (_, orch) = orchestrator(market, engine(2));

        let err = orch.run(request(&["ONE", "GHOST"])).await.unwrap_err();
        match err {
            BacktestError::AllInstrumentsFailed { count, first } => {
                assert_eq!(count, 2);
                assert!(first.contains("insufficient data"));
            }
            other => panic!("expected AllInstrumentsFailed, got {other:?}"),
        }
    }
}

mod request_validation {
    use super::*;

    #[tokio::test]
    async fn start_equal_to_end_is_invalid() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let (m, orch) = orchestrator(market, engine(1));

        let mut req = request(&["FIGI_A"]);
        req.end_date = req.start_date;
        let err = orch.run(req).await.unwrap_err();
        assert!(matches!(err, BacktestError::InvalidRequest { field, .. } if field == "start_date"));
        assert_eq!(m.fetch_count(), 0);
    }

    #[tokio::test]
    async fn empty_and_duplicate_lists_are_invalid() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let (_, orch) = orchestrator(market, engine(1));

        assert!(matches!(
            orch.run(request(&[])).await,
            Err(BacktestError::InvalidRequest { .. })
        ));
        assert!(matches!(
            orch.run(request(&["FIGI_A", "figi_a"])).await,
            Err(BacktestError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn strict_mode_rejects_unknown_before_fetching() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let config = EngineConfig {
            strict_instruments: true,
            ..engine(2)
        };
        let (m, orch) = orchestrator(market, config);

        let err = orch.run(request(&["FIGI_A", "GHOST"])).await.unwrap_err();
        assert!(matches!(err, BacktestError::InvalidRequest { field, .. } if field == "instruments"));
        assert_eq!(m.fetch_count(), 0);
    }

    #[tokio::test]
    async fn malformed_expression_is_alpha_parse() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let (_, orch) = orchestrator(market, engine(1));

        let req = request(&["FIGI_A"]).with_alpha(AlphaSpec::Expression {
            expression: "rank(close".into(),
            forward_fill: false,
        });
        assert!(matches!(orch.run(req).await, Err(BacktestError::AlphaParse(_))));
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn timeout_fails_the_request() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0])
            .with_latency("FIGI_A", Duration::from_millis(400));
        let config = EngineConfig {
            timeout: Some(Duration::from_millis(50)),
            ..engine(1)
        };
        let (_, orch) = orchestrator(market, config);

        let err = orch.run(request(&["FIGI_A"])).await.unwrap_err();
        assert!(matches!(err, BacktestError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancel_future_fails_the_request() {
        let market = MockMarket::new()
            .with_series("FIGI_A", "AAA", &[100.0, 101.0])
            .with_latency("FIGI_A", Duration::from_millis(400));
        let (_, orch) = orchestrator(market, engine(1));

        let err = orch
            .run_until(
                request(&["FIGI_A"]),
                tokio::time::sleep(Duration::from_millis(30)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BacktestError::Cancelled));
    }

    #[tokio::test]
    async fn generous_timeout_does_not_interfere() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let config = EngineConfig {
            timeout: Some(Duration::from_secs(30)),
            ..engine(1)
        };
        let (_, orch) = orchestrator(market, config);
        assert!(orch.run(request(&["FIGI_A"])).await.is_ok());
    }
}

mod alphas {
    use super::*;

    fn market() -> MockMarket {
        MockMarket::new().with_series("FIGI_A", "AAA", &generate_closes(80, 100.0))
    }

    #[tokio::test]
    async fn every_alpha_kind_runs() {
        let (_, orch) = orchestrator(market(), engine(2));
        let specs = vec![
            AlphaSpec::BuyAndHold,
            AlphaSpec::SmaCrossover {
                fast: 3,
                slow: 10,
                allow_short: true,
            },
            AlphaSpec::alpha1(),
            AlphaSpec::Expression {
                expression: "rank(delta(close, 5))".into(),
                forward_fill: false,
            },
            AlphaSpec::Expression {
                expression: "-correlation(open, volume, 10)".into(),
                forward_fill: false,
            },
        ];
        for spec in specs {
            let result = orch.run(request(&["FIGI_A"]).with_alpha(spec.clone())).await.unwrap();
            let summary = result.results[0].summary().unwrap();
            assert!(summary.metrics.total_return.is_finite(), "{spec}");
            assert!(summary.metrics.max_drawdown <= 0.0, "{spec}");
        }
    }

    #[tokio::test]
    async fn summary_carries_alpha_name() {
        let (_, orch) = orchestrator(market(), engine(1));
        let req = request(&["FIGI_A"]).with_alpha(AlphaSpec::Expression {
            expression: "sign( delta(close,1) )".into(),
            forward_fill: false,
        });
        let result = orch.run(req).await.unwrap();
        assert_eq!(
            result.results[0].summary().unwrap().alpha,
            "expr:sign(delta(close, 1))"
        );
    }

    #[tokio::test]
    async fn forward_fill_inserts_missing_weekdays() {
        // Monday, Wednesday, Thursday: Tuesday is missing
        let points = vec![
            PricePoint::close_only(date(2024, 1, 1), 100.0),
            PricePoint::close_only(date(2024, 1, 3), 102.0),
            PricePoint::close_only(date(2024, 1, 4), 101.0),
        ];
        let market = MockMarket::new().with_points("FIGI_A", "AAA", points);
        let (_, orch) = orchestrator(market, engine(1));

        let spec = |forward_fill| AlphaSpec::Expression {
            expression: "1".into(),
            forward_fill,
        };
        let gapped = orch
            .run(request(&["FIGI_A"]).with_alpha(spec(false)).with_curve(true))
            .await
            .unwrap();
        let filled = orch
            .run(request(&["FIGI_A"]).with_alpha(spec(true)).with_curve(true))
            .await
            .unwrap();

        let gapped = gapped.results[0].summary().unwrap();
        let filled = filled.results[0].summary().unwrap();
        assert_eq!(gapped.equity_curve.as_ref().unwrap().len(), 3);
        assert_eq!(filled.equity_curve.as_ref().unwrap().len(), 4);
        assert_abs_diff_eq!(
            gapped.metrics.total_return,
            filled.metrics.total_return,
            epsilon = 1e-12
        );
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn injected_cache_avoids_refetching() {
        let market = Arc::new(MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0, 103.0]));
        let cache = Arc::new(CachedPriceStore::new(
            market.clone() as Arc<dyn PriceSeriesStore>,
            16,
        ));
        let orch = BacktestOrchestrator::new(
            market.clone() as Arc<dyn InstrumentCatalog>,
            cache.clone() as Arc<dyn PriceSeriesStore>,
            engine(1),
        );

        let first = orch.run(request(&["FIGI_A"])).await.unwrap();
        let second = orch.run(request(&["FIGI_A"])).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(market.fetch_count(), 1);

        cache.invalidate("FIGI_A").unwrap();
        orch.run(request(&["FIGI_A"])).await.unwrap();
        assert_eq!(market.fetch_count(), 2);
    }

    #[tokio::test]
    async fn engine_never_caches_on_its_own() {
        let market = MockMarket::new().with_series("FIGI_A", "AAA", &[100.0, 101.0]);
        let (m, orch) = orchestrator(market, engine(1));
        orch.run(request(&["FIGI_A"])).await.unwrap();
        orch.run(request(&["FIGI_A"])).await.unwrap();
        assert_eq!(m.fetch_count(), 2);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_parity {
    use super::*;
    use alphatest::adapters::memory_adapter::InMemoryAdapter;
    use alphatest::adapters::sqlite_adapter::SqliteAdapter;

    #[tokio::test]
    async fn sqlite_and_memory_agree() {
        let closes = generate_closes(40, 75.0);
        let points = make_points("2024-02-01", &closes);
        let instrument = make_instrument("BBG000000001", "ACME");

        let memory = Arc::new(InMemoryAdapter::new());
        memory.add_series(instrument.clone(), points.clone()).unwrap();

        let sqlite = Arc::new(SqliteAdapter::in_memory().unwrap());
        sqlite.initialize_schema().unwrap();
        sqlite.insert_instruments(&[instrument]).unwrap();
        sqlite.insert_prices("BBG000000001", &points).unwrap();

        let req = request(&["acme"]).with_alpha(AlphaSpec::alpha1()).with_curve(true);
        let from_memory = BacktestOrchestrator::new(
            memory.clone() as Arc<dyn InstrumentCatalog>,
            memory as Arc<dyn PriceSeriesStore>,
            engine(2),
        )
        .run(req.clone())
        .await
        .unwrap();
        let from_sqlite = BacktestOrchestrator::new(
            sqlite.clone() as Arc<dyn InstrumentCatalog>,
            sqlite as Arc<dyn PriceSeriesStore>,
            engine(2),
        )
        .run(req)
        .await
        .unwrap();

        assert_eq!(from_memory, from_sqlite);
    }
}
