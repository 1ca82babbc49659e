use crate::analysis::correlation::{CorrelationMonitor, ReturnMatrix};
use crate::analysis::iv_rank::{IvPercentileRanker, IvSignalThresholds};
use crate::analysis::premium::{PremiumScanner, ScanEntry, ScanInput, ScanReport};
use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::feeds::snapshot::Snapshot;
use crate::models::garch::GarchForecaster;
use crate::models::volatility::RealizedVolEstimator;
use crate::report::{IvView, Outcome, PairReport, RunReport, TickerAnalysis, TickerReport, TickerSections};
use crate::series::PriceSeries;
use std::sync::Arc;
use std::time::Duration;

/// Configured analytics shared (read-only) by every worker.
#[derive(Debug, Clone)]
pub struct Engine {
    estimator: RealizedVolEstimator,
    scanner: PremiumScanner,
    ranker: IvPercentileRanker,
    iv_thresholds: IvSignalThresholds,
    forecaster: GarchForecaster,
    monitor: CorrelationMonitor,
    garch_horizon: usize,
    ticker_timeout: Duration,
}

impl Engine {
    pub fn from_config(cfg: &AppConfig) -> EngineResult<Self> {
        Ok(Self {
            estimator: RealizedVolEstimator::default(),
            scanner: PremiumScanner::new(cfg.scanner)?,
            ranker: IvPercentileRanker::new(cfg.scanner.iv_lookback)?,
            iv_thresholds: IvSignalThresholds::default(),
            forecaster: GarchForecaster::new(cfg.garch_policy),
            monitor: CorrelationMonitor::new(cfg.correlation)?,
            garch_horizon: cfg.garch_horizon,
            ticker_timeout: cfg.ticker_timeout,
        })
    }

    /// All per-ticker analytics. Pure and synchronous.
    pub fn analyze(&self, input: &ScanInput) -> TickerAnalysis {
        let rv_window = self.scanner.config().rv_window;
        let iv_values = input.iv_history.values();

        let premium = self.scanner.scan(
            &input.ticker,
            input.current_iv,
            &input.prices,
            &iv_values,
            input.premium_history.as_deref(),
        );
        let iv = self.ranker.rank(&iv_values, input.current_iv).map(|percentile| IvView {
            signal: percentile.signal(&self.iv_thresholds),
            percentile,
        });
        let garch = self.forecaster.summarize(&input.prices.log_returns(), self.garch_horizon);

        if let Err(e) = &garch {
            tracing::warn!(ticker = %input.ticker, error = %e, "garch forecast failed");
        }

        TickerAnalysis {
            close_to_close: self.estimator.close_to_close(&input.prices, rv_window),
            parkinson: self.estimator.parkinson(&input.prices, rv_window),
            iv,
            premium,
            garch,
        }
    }

    /// Correlation regimes across every validated price series.
    pub fn correlation(&self, series: &[(String, PriceSeries)]) -> EngineResult<Vec<PairReport>> {
        let refs: Vec<(&str, &PriceSeries)> = series.iter().map(|(t, s)| (t.as_str(), s)).collect();
        let matrix = ReturnMatrix::from_prices(&refs)?;
        let entries = self.monitor.regimes(&matrix)?;
        Ok(entries
            .into_iter()
            .map(|e| PairReport { pair: e.pair, outcome: e.outcome.into() })
            .collect())
    }
}

/// Batch job over a loaded snapshot.
///
/// Each ticker runs on the blocking pool under its own time budget. A ticker
/// that fails validation, errors out or overruns becomes an error entry; the
/// rest of the batch is unaffected. Correlation regimes run once over every
/// ticker whose price series validated.
pub async fn run(engine: Arc<Engine>, snapshot: Snapshot) -> RunReport {
    let started = chrono::Utc::now();

    // ── Validate ──
    let prepared: Vec<(String, EngineResult<ScanInput>)> = snapshot
        .tickers
        .into_iter()
        .map(|raw| {
            let ticker = raw.ticker.clone();
            let input = raw.into_scan_input(&engine.estimator);
            if let Err(e) = &input {
                tracing::warn!(ticker = %ticker, error = %e, "ticker rejected");
            }
            (ticker, input)
        })
        .collect();

    let series: Vec<(String, PriceSeries)> = prepared
        .iter()
        .filter_map(|(t, input)| input.as_ref().ok().map(|i| (t.clone(), i.prices.clone())))
        .collect();

    // ── Per-ticker workers ──
    let jobs = prepared.into_iter().map(|(ticker, input)| {
        let engine = Arc::clone(&engine);
        async move {
            let outcome = match input {
                Ok(input) => run_ticker(engine, input).await,
                Err(e) => Err(e),
            };
            (ticker, outcome)
        }
    });
    let results = futures_util::future::join_all(jobs).await;

    let mut scan = ScanReport::default();
    let mut tickers = Vec::with_capacity(results.len());
    for (ticker, outcome) in results {
        let premium = match &outcome {
            Ok(analysis) => analysis.premium.clone(),
            Err(e) => Err(e.clone()),
        };
        scan.entries.push(ScanEntry { ticker: ticker.clone(), outcome: premium });
        tickers.push(TickerReport { ticker, outcome: outcome.map(TickerSections::from).into() });
    }

    // ── Correlation ──
    let correlation: Outcome<Vec<PairReport>> = engine.correlation(&series).into();
    if let Some(e) = &correlation.error {
        tracing::warn!(error = %e.message, "correlation regimes unavailable");
    }

    tracing::info!(
        tickers = tickers.len(),
        failed = scan.failures().count(),
        elapsed_ms = (chrono::Utc::now() - started).num_milliseconds(),
        "batch complete"
    );

    RunReport::new(started, &scan, tickers, correlation)
}

/// Analyze one ticker on the blocking pool within `ticker_timeout`.
///
/// The budget bounds how long the batch waits, not the work itself: a blocking
/// task cannot be cancelled, so an overrunning analysis keeps its thread until
/// the GARCH iteration cap ends it and its result is discarded.
async fn run_ticker(engine: Arc<Engine>, input: ScanInput) -> EngineResult<TickerAnalysis> {
    let ticker = input.ticker.clone();
    let budget = engine.ticker_timeout;
    let task = tokio::task::spawn_blocking(move || engine.analyze(&input));

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(analysis)) => {
            tracing::debug!(ticker = %ticker, "ticker analyzed");
            Ok(analysis)
        }
        Ok(Err(e)) => {
            tracing::error!(ticker = %ticker, error = %e, "worker aborted");
            Err(EngineError::Worker(format!("{ticker}: {e}")))
        }
        Err(_) => {
            tracing::warn!(ticker = %ticker, budget_secs = budget.as_secs_f64(), "ticker timed out");
            Err(EngineError::Timeout(format!("{ticker} exceeded {:.1}s", budget.as_secs_f64())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::correlation::CorrelationConfig;
    use crate::analysis::premium::ScannerConfig;
    use crate::feeds::snapshot::parse_snapshot;
    use crate::models::optimizer::ConvergencePolicy;
    use crate::testutil;
    use std::path::PathBuf;

    fn config() -> AppConfig {
        AppConfig {
            snapshot_path: PathBuf::from("unused.json"),
            scanner: ScannerConfig::default(),
            correlation: CorrelationConfig { baseline_window: 200, ..Default::default() },
            garch_policy: ConvergencePolicy::default(),
            garch_horizon: 5,
            ticker_timeout: Duration::from_secs(60),
        }
    }

    fn ticker_json(name: &str, seed: u64, n: usize) -> String {
        let returns = testutil::garch_returns(n, 5e-6, 0.1, 0.85, seed);
        let bars = serde_json::to_string(testutil::prices_from_returns(&returns).bars()).unwrap();
        format!(r#"{{"ticker":"{name}","current_iv":0.30,"bars":{bars}}}"#)
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let raw = format!(
            r#"{{"tickers":[{},{},{{"ticker":"EMPTY","current_iv":0.2,"bars":[]}}]}}"#,
            ticker_json("AAA", 1, 300),
            ticker_json("BBB", 2, 300),
        );
        let engine = Arc::new(Engine::from_config(&config()).unwrap());
        let report = run(engine, parse_snapshot(&raw).unwrap()).await;

        let names: Vec<_> = report.tickers.iter().map(|t| t.ticker.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB", "EMPTY"]);
        assert!(report.tickers[0].outcome.is_ok());
        assert!(report.tickers[1].outcome.is_ok());
        assert!(!report.tickers[2].outcome.is_ok());
        assert_eq!(report.signals.no_signal, 1);
        assert_eq!(report.ranked.len(), 2);

        // EMPTY never validated, so only one pair
        let pairs = report.correlation.value.as_ref().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].pair, "AAA/BBB");
    }

    #[tokio::test]
    async fn test_single_ticker_has_no_correlation() {
        let raw = format!(r#"{{"tickers":[{}]}}"#, ticker_json("AAA", 3, 300));
        let engine = Arc::new(Engine::from_config(&config()).unwrap());
        let report = run(engine, parse_snapshot(&raw).unwrap()).await;

        assert!(report.tickers[0].outcome.is_ok());
        let err = report.correlation.error.as_ref().unwrap();
        assert_eq!(err.kind, "invalid_argument");
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_entry() {
        let raw = format!(
            r#"{{"tickers":[{},{},{{"ticker":"EMPTY","current_iv":0.2,"bars":[]}}]}}"#,
            ticker_json("AAA", 4, 3000),
            ticker_json("BBB", 5, 3000),
        );
        let cfg = AppConfig { ticker_timeout: Duration::from_nanos(1), ..config() };
        let engine = Arc::new(Engine::from_config(&cfg).unwrap());
        let report = run(engine, parse_snapshot(&raw).unwrap()).await;

        assert_eq!(report.tickers.len(), 3);
        for t in &report.tickers[..2] {
            let err = t.outcome.error.as_ref().unwrap();
            assert_eq!(err.kind, "timeout", "{}: {}", t.ticker, err.message);
        }
        assert_eq!(report.tickers[2].outcome.error.as_ref().unwrap().kind, "insufficient_data");
        assert_eq!(report.signals.no_signal, 3);
        assert!(report.ranked.is_empty());
        // correlation only needs the validated prices
        assert!(report.correlation.is_ok());
    }

    #[tokio::test]
    async fn test_one_year_snapshot_reports_correlation() {
        // 251 returns -> 252 bars, the default baseline falls back to all of them
        let raw = format!(r#"{{"tickers":[{},{}]}}"#, ticker_json("SPY", 6, 251), ticker_json("QQQ", 7, 251));
        let cfg = AppConfig { correlation: Default::default(), ..config() };
        let engine = Arc::new(Engine::from_config(&cfg).unwrap());
        let report = run(engine, parse_snapshot(&raw).unwrap()).await;

        let pairs = report.correlation.value.as_ref().unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].outcome.is_ok(), "{:?}", pairs[0].outcome.error);
    }

    #[test]
    fn test_analyze_sections() {
        let engine = Engine::from_config(&config()).unwrap();
        let returns = testutil::garch_returns(1000, 5e-6, 0.1, 0.85, 9);
        let input = ScanInput {
            ticker: "SPY".into(),
            current_iv: 0.25,
            prices: testutil::prices_from_returns(&returns),
            iv_history: testutil::iv_history(&[0.15, 0.20, 0.25, 0.30]),
            premium_history: None,
        };
        let a = engine.analyze(&input);
        assert!(a.close_to_close.is_ok());
        assert!(a.parkinson.is_ok(), "close-only bars give a zero range, not an error");
        assert!(a.premium.is_ok());
        assert_eq!(a.iv.as_ref().unwrap().percentile.lookback, 4);
        let garch = a.garch.unwrap();
        assert_eq!(garch.path.horizon(), 5);
        assert!(garch.persistence < 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config();
        cfg.correlation.rolling_window = 1;
        assert!(Engine::from_config(&cfg).is_err());
    }
}
